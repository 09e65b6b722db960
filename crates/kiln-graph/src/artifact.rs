//! Artifact sets consumed by initial transformation nodes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kiln_transform::{ArtifactId, Failure};

use crate::error::ResolveError;

/// An artifact resolved to a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
  pub id: ArtifactId,
  pub file: PathBuf,
}

/// Outcome of resolving an artifact set: what resolved and what failed.
#[derive(Debug, Default)]
pub struct ArtifactResolution {
  pub artifacts: Vec<ResolvedArtifact>,
  pub failures: Vec<Failure>,
}

/// A not-yet-resolved set naming a single artifact.
///
/// Resolution may perform I/O. Failures are reported in the returned
/// resolution, never raised.
#[async_trait]
pub trait ResolvableArtifactSet: Send + Sync {
  fn artifact_id(&self) -> &ArtifactId;

  async fn resolve(&self) -> ArtifactResolution;
}

/// Resolves an artifact to a local file that must already exist.
#[derive(Debug, Clone)]
pub struct FileArtifactSet {
  id: ArtifactId,
  file: PathBuf,
}

impl FileArtifactSet {
  pub fn new(id: ArtifactId, file: impl Into<PathBuf>) -> Self {
    Self {
      id,
      file: file.into(),
    }
  }
}

#[async_trait]
impl ResolvableArtifactSet for FileArtifactSet {
  fn artifact_id(&self) -> &ArtifactId {
    &self.id
  }

  async fn resolve(&self) -> ArtifactResolution {
    match tokio::fs::try_exists(&self.file).await {
      Ok(true) => ArtifactResolution {
        artifacts: vec![ResolvedArtifact {
          id: self.id.clone(),
          file: self.file.clone(),
        }],
        failures: Vec::new(),
      },
      Ok(false) => ArtifactResolution {
        artifacts: Vec::new(),
        failures: vec![Arc::new(ResolveError::NotFound {
          artifact: self.id.clone(),
          path: self.file.clone(),
        })],
      },
      Err(e) => ArtifactResolution {
        artifacts: Vec::new(),
        failures: vec![Arc::new(ResolveError::Unresolvable {
          artifact: self.id.clone(),
          message: e.to_string(),
        })],
      },
    }
  }
}
