use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KilnConfig {
  /// Number of workers allowed to run transforms concurrently.
  #[serde(default = "default_parallelism")]
  pub parallelism: usize,
  /// Wall-clock budget for a single transform execution.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub transform_timeout_ms: Option<u64>,
  #[serde(default)]
  pub build_cache: BuildCacheConfig,
  /// Root for workspaces, execution history and the local build cache.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildCacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Cache directory. Defaults to `<data_dir>/cache` when unset.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub directory: Option<PathBuf>,
}

impl Default for BuildCacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      directory: None,
    }
  }
}

impl Default for KilnConfig {
  fn default() -> Self {
    Self {
      parallelism: default_parallelism(),
      transform_timeout_ms: None,
      build_cache: BuildCacheConfig::default(),
      data_dir: None,
    }
  }
}

impl KilnConfig {
  /// Load and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config: KilnConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.parallelism == 0 {
      return Err(ConfigError::InvalidParallelism(self.parallelism));
    }
    if self.transform_timeout_ms == Some(0) {
      return Err(ConfigError::ZeroTimeout);
    }
    Ok(())
  }

  pub fn transform_timeout(&self) -> Option<Duration> {
    self.transform_timeout_ms.map(Duration::from_millis)
  }

  /// Directory holding the local build cache, if one can be determined.
  pub fn cache_dir(&self) -> Option<PathBuf> {
    self
      .build_cache
      .directory
      .clone()
      .or_else(|| self.data_dir.as_ref().map(|dir| dir.join("cache")))
  }
}

fn default_parallelism() -> usize {
  std::thread::available_parallelism()
    .map(|n| n.get())
    .unwrap_or(1)
}

fn default_true() -> bool {
  true
}
