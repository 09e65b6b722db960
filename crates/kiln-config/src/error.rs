use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("cannot create executor for requested number of worker threads: {0}")]
  InvalidParallelism(usize),

  #[error("transform timeout must be greater than zero")]
  ZeroTimeout,

  #[error("chain '{0}' has no steps")]
  EmptyChain(String),

  #[error("chain '{0}' has no inputs")]
  NoInputs(String),
}
