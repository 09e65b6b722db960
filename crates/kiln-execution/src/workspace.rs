use std::path::PathBuf;

use crate::hash::HashCode;

/// Hands out the exclusive output directory for a unit of work.
pub trait WorkspaceProvider: Send + Sync {
  fn workspace(&self, key: &HashCode) -> PathBuf;
}

/// Workspaces as subdirectories of a root, named by the hex key.
#[derive(Debug, Clone)]
pub struct DirWorkspaceProvider {
  root: PathBuf,
}

impl DirWorkspaceProvider {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &PathBuf {
    &self.root
  }
}

impl WorkspaceProvider for DirWorkspaceProvider {
  fn workspace(&self, key: &HashCode) -> PathBuf {
    self.root.join(key.to_hex())
  }
}
