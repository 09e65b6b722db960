use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A transform chain to apply to a set of input files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDef {
  pub name: String,
  /// Resolution context the inputs belong to (e.g. `runtimeClasspath`).
  #[serde(default = "default_scope")]
  pub scope: String,
  pub inputs: Vec<InputDef>,
  pub steps: Vec<StepDef>,
}

/// A single input file, optionally identified as an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDef {
  pub path: PathBuf,
  /// Component that produced the file, e.g. `org:lib:1.0`. Inputs without a
  /// component are treated as loose files.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub component: Option<String>,
}

/// One transform step, referring to a built-in transform by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub transform: String,
  #[serde(default)]
  pub params: serde_json::Value,
}

impl ChainDef {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let chain: ChainDef = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    chain.validate()?;
    Ok(chain)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.steps.is_empty() {
      return Err(ConfigError::EmptyChain(self.name.clone()));
    }
    if self.inputs.is_empty() {
      return Err(ConfigError::NoInputs(self.name.clone()));
    }
    Ok(())
  }
}

fn default_scope() -> String {
  "default".to_string()
}
