use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use kiln_transform::{ArtifactId, Failure};
use thiserror::Error;

/// Violations of the graph node contract.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("transformation {node} hasn't been executed yet")]
  NotExecuted { node: String },

  #[error("transformation {node} has already been executed")]
  AlreadyExecuted { node: String },

  #[error("expected exactly one artifact for {artifact}, resolved {count}")]
  UnexpectedArtifactCount { artifact: ArtifactId, count: usize },

  #[error(transparent)]
  Operation(#[from] OperationError),
}

/// Errors raised by the build operation runner.
#[derive(Debug, Error)]
pub enum OperationError {
  #[error("cannot create executor for requested number of worker threads: {0}")]
  InvalidParallelism(usize),

  #[error("build operation runner is shut down")]
  Closed,

  #[error("build operation '{operation}' failed to complete: {message}")]
  Join { operation: String, message: String },
}

/// A single artifact could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("could not find {artifact}: {} does not exist", path.display())]
  NotFound { artifact: ArtifactId, path: PathBuf },

  #[error("could not resolve {artifact}: {message}")]
  Unresolvable { artifact: ArtifactId, message: String },
}

/// Several failures (or a failure of another kind) while resolving the
/// artifacts feeding one transform.
#[derive(Debug)]
pub struct ArtifactResolveError {
  display_name: String,
  failures: Vec<Failure>,
}

impl ArtifactResolveError {
  pub fn new(display_name: impl Into<String>, failures: Vec<Failure>) -> Self {
    Self {
      display_name: display_name.into(),
      failures,
    }
  }

  pub fn failures(&self) -> &[Failure] {
    &self.failures
  }
}

impl fmt::Display for ArtifactResolveError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "could not resolve all artifacts for {}", self.display_name)?;
    for failure in &self.failures {
      write!(f, "\n  - {failure}")?;
    }
    Ok(())
  }
}

impl Error for ArtifactResolveError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    self.failures.first().map(|failure| failure.as_ref() as &(dyn Error + 'static))
  }
}
