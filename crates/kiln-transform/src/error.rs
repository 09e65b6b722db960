use std::path::PathBuf;

use kiln_execution::BoxError;
use thiserror::Error;

/// Errors raised while invoking or validating a transform.
#[derive(Debug, Error)]
pub enum TransformError {
  /// The action produced no result list at all.
  #[error("transform returned null result")]
  NullResult,

  #[error("transform output file {} does not exist", path.display())]
  MissingOutput { path: PathBuf },

  #[error(
    "transform output file {} is not a child of the transform's input file or output directory",
    path.display()
  )]
  OutsideOutputLocations { path: PathBuf },

  /// The action itself failed.
  #[error("failed to transform {} using {transformer}: {source}", input.display())]
  Invocation {
    input: PathBuf,
    transformer: String,
    #[source]
    source: BoxError,
  },

  /// `files()` was called on a failed subject.
  #[error("{display_name} has no files, its transformation failed")]
  FailedSubject { display_name: String },

  #[error("unknown transform '{0}'")]
  UnknownTransform(String),

  #[error("invalid parameters for transform '{transform}': {message}")]
  InvalidParameters { transform: String, message: String },
}
