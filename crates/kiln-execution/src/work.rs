//! The unit of work contract executed by the pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::hash::HashCode;
use crate::snapshot::{FileSnapshot, FileSystemSnapshotter};

/// A piece of work the pipeline may skip, load from cache, or execute.
pub trait UnitOfWork: Send + Sync {
  /// Stable key the execution history is recorded under.
  fn identity(&self) -> &str;

  fn display_name(&self) -> String;

  /// Fingerprint of the implementation and its parameters.
  fn implementation_hash(&self) -> HashCode;

  /// Snapshot every declared input, keyed by a stable input name.
  fn snapshot_inputs(
    &self,
    snapshotter: &FileSystemSnapshotter,
  ) -> Result<BTreeMap<String, FileSnapshot>, ExecutionError>;

  /// The exclusive directory the work writes into.
  fn output_directory(&self) -> &Path;

  /// The input file whose outputs may live inside it, if the work has one.
  ///
  /// Cached results that point into this input are restored against the
  /// current one, never against the path of the build that stored them.
  fn primary_input(&self) -> Option<&Path> {
    None
  }

  fn timeout(&self) -> Option<Duration> {
    None
  }

  fn is_cacheable(&self) -> bool {
    true
  }

  /// Run the raw work, returning the produced output files.
  ///
  /// Runs on a blocking thread.
  fn execute(&self) -> Result<Vec<PathBuf>, ExecutionError>;
}

/// How a successful result came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
  /// Previous outputs were reused; nothing ran.
  UpToDate,
  /// Outputs were restored from the build cache.
  FromCache,
  /// The raw work ran.
  Executed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOutput {
  pub outcome: ExecutionOutcome,
  pub files: Vec<PathBuf>,
}
