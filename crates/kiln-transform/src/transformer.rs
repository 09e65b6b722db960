//! The transformer contract.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_execution::{BoxError, HashCode};
use serde_json::Value;
use tracing::debug;

use crate::dependencies::ArtifactDependencies;
use crate::error::TransformError;
use crate::identity::IdentityHash;

/// User-supplied transform logic, treated as an opaque callable.
///
/// Returning `Ok(None)` means the action produced no result list, which is
/// rejected by validation.
pub trait TransformAction: Send + Sync {
  fn transform(
    &self,
    primary_input: &Path,
    output_dir: &Path,
    dependencies: &dyn ArtifactDependencies,
  ) -> Result<Option<Vec<PathBuf>>, BoxError>;
}

/// Converts one input file into a validated list of output files.
///
/// Two transformers are equal when their identity hashes are equal.
pub trait Transformer: Send + Sync {
  fn identity_hash(&self) -> HashCode;

  fn display_name(&self) -> &str;

  /// Whether the transform reads its upstream dependencies.
  fn requires_dependencies(&self) -> bool {
    false
  }

  fn transform(
    &self,
    primary_input: &Path,
    output_dir: &Path,
    dependencies: &dyn ArtifactDependencies,
  ) -> Result<Vec<PathBuf>, TransformError>;
}

impl PartialEq for dyn Transformer {
  fn eq(&self, other: &Self) -> bool {
    self.identity_hash() == other.identity_hash()
  }
}

impl Eq for dyn Transformer {}

impl fmt::Debug for dyn Transformer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Transformer")
      .field("display_name", &self.display_name())
      .field("identity_hash", &self.identity_hash())
      .finish()
  }
}

/// A [`Transformer`] wrapping a [`TransformAction`].
pub struct DefaultTransformer {
  display_name: String,
  identity_hash: HashCode,
  requires_dependencies: bool,
  action: Arc<dyn TransformAction>,
}

impl DefaultTransformer {
  /// Create a transformer whose identity is `implementation` plus `params`.
  pub fn new(implementation: &str, params: &Value, action: Arc<dyn TransformAction>) -> Self {
    Self {
      display_name: implementation.to_string(),
      identity_hash: IdentityHash::of(implementation, params),
      requires_dependencies: false,
      action,
    }
  }

  pub fn with_dependencies(mut self) -> Self {
    self.requires_dependencies = true;
    self
  }
}

impl Transformer for DefaultTransformer {
  fn identity_hash(&self) -> HashCode {
    self.identity_hash
  }

  fn display_name(&self) -> &str {
    &self.display_name
  }

  fn requires_dependencies(&self) -> bool {
    self.requires_dependencies
  }

  fn transform(
    &self,
    primary_input: &Path,
    output_dir: &Path,
    dependencies: &dyn ArtifactDependencies,
  ) -> Result<Vec<PathBuf>, TransformError> {
    debug!(
      transformer = %self.display_name,
      input = %primary_input.display(),
      "running transform action"
    );
    let outputs = self
      .action
      .transform(primary_input, output_dir, dependencies)
      .map_err(|source| TransformError::Invocation {
        input: primary_input.to_path_buf(),
        transformer: self.display_name.clone(),
        source,
      })?;
    validate_outputs(primary_input, output_dir, outputs)
  }
}

/// Check that every output exists and lives in a permitted location.
///
/// Permitted: the primary input itself, the output directory itself, or any
/// path under either of them.
pub fn validate_outputs(
  primary_input: &Path,
  output_dir: &Path,
  outputs: Option<Vec<PathBuf>>,
) -> Result<Vec<PathBuf>, TransformError> {
  let outputs = outputs.ok_or(TransformError::NullResult)?;
  for output in &outputs {
    if !output.exists() {
      return Err(TransformError::MissingOutput {
        path: output.clone(),
      });
    }
    // Path::starts_with compares whole components, so `/out-other` is not
    // under `/out`.
    if output.starts_with(output_dir) || output.starts_with(primary_input) {
      continue;
    }
    return Err(TransformError::OutsideOutputLocations {
      path: output.clone(),
    });
  }
  Ok(outputs)
}
