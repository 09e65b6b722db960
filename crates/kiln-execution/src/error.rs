//! Error types for the execution pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by raw work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can end an execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// The raw work failed or produced invalid results.
  #[error("execution failed for {work}: {source}")]
  Invocation {
    work: String,
    #[source]
    source: BoxError,
  },

  /// The raw work did not finish within its budget.
  #[error("{work} timed out after {}ms", timeout.as_millis())]
  Timeout { work: String, timeout: Duration },

  /// The build was cancelled before or while the work ran.
  #[error("execution of {work} was cancelled")]
  Cancelled { work: String },

  /// The raw work or an inner step panicked.
  #[error("execution of {work} panicked: {message}")]
  Panicked { work: String, message: String },

  /// An input or output could not be snapshotted.
  #[error("failed to snapshot {path}: {source}")]
  Snapshot {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The output directory could not be created.
  #[error("failed to create output directory {path}: {source}")]
  OutputDirectory {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl ExecutionError {
  /// Cancellation is a termination, not a failure of the work itself.
  pub fn is_cancellation(&self) -> bool {
    matches!(self, Self::Cancelled { .. })
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Timeout { .. })
  }
}

/// Errors raised by an execution history store.
#[derive(Debug, Error)]
pub enum HistoryError {
  #[error("history io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("corrupt history entry for '{identity}': {source}")]
  Corrupt {
    identity: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Errors raised by a build cache.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("build cache io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("corrupt build cache entry {key}: {message}")]
  Corrupt { key: String, message: String },
}
