//! Execution history stores.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::context::AfterExecutionState;
use crate::error::HistoryError;
use crate::hash::HashCode;

/// Remembers the last execution of each unit of work, keyed by identity.
#[async_trait]
pub trait ExecutionHistoryStore: Send + Sync {
  async fn load(&self, identity: &str) -> Result<Option<AfterExecutionState>, HistoryError>;

  async fn store(&self, identity: &str, state: AfterExecutionState) -> Result<(), HistoryError>;

  async fn remove(&self, identity: &str) -> Result<(), HistoryError>;
}

#[derive(Default)]
pub struct InMemoryExecutionHistoryStore {
  entries: RwLock<HashMap<String, AfterExecutionState>>,
}

impl InMemoryExecutionHistoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl ExecutionHistoryStore for InMemoryExecutionHistoryStore {
  async fn load(&self, identity: &str) -> Result<Option<AfterExecutionState>, HistoryError> {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    Ok(entries.get(identity).cloned())
  }

  async fn store(&self, identity: &str, state: AfterExecutionState) -> Result<(), HistoryError> {
    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    entries.insert(identity.to_string(), state);
    Ok(())
  }

  async fn remove(&self, identity: &str) -> Result<(), HistoryError> {
    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    entries.remove(identity);
    Ok(())
  }
}

/// Stores one JSON document per identity under a directory.
#[derive(Debug, Clone)]
pub struct FsExecutionHistoryStore {
  root: PathBuf,
}

impl FsExecutionHistoryStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn entry_path(&self, identity: &str) -> PathBuf {
    self
      .root
      .join(format!("{}.json", HashCode::of_str(identity).to_hex()))
  }
}

fn io_error(path: &Path, source: io::Error) -> HistoryError {
  HistoryError::Io {
    path: path.to_path_buf(),
    source,
  }
}

#[async_trait]
impl ExecutionHistoryStore for FsExecutionHistoryStore {
  async fn load(&self, identity: &str) -> Result<Option<AfterExecutionState>, HistoryError> {
    let path = self.entry_path(identity);
    let content = match tokio::fs::read(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(io_error(&path, e)),
    };
    let state = serde_json::from_slice(&content).map_err(|source| HistoryError::Corrupt {
      identity: identity.to_string(),
      source,
    })?;
    Ok(Some(state))
  }

  async fn store(&self, identity: &str, state: AfterExecutionState) -> Result<(), HistoryError> {
    tokio::fs::create_dir_all(&self.root)
      .await
      .map_err(|e| io_error(&self.root, e))?;

    let path = self.entry_path(identity);
    let content = serde_json::to_vec_pretty(&state).map_err(|source| HistoryError::Corrupt {
      identity: identity.to_string(),
      source,
    })?;

    // Write then rename so a concurrent reader never sees a partial document.
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, content)
      .await
      .map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, &path)
      .await
      .map_err(|e| io_error(&path, e))
  }

  async fn remove(&self, identity: &str) -> Result<(), HistoryError> {
    let path = self.entry_path(identity);
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(io_error(&path, e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::{BeforeExecutionState, OriginMetadata};
  use crate::snapshot::{FileSnapshot, OutputSnapshot};
  use std::collections::BTreeMap;

  fn sample_state() -> AfterExecutionState {
    let mut inputs = BTreeMap::new();
    inputs.insert(
      "primary".to_string(),
      FileSnapshot::RegularFile {
        hash: HashCode::of_str("input"),
      },
    );
    let mut files = BTreeMap::new();
    files.insert(
      PathBuf::from("/ws/out.txt"),
      FileSnapshot::RegularFile {
        hash: HashCode::of_str("output"),
      },
    );
    AfterExecutionState {
      before: BeforeExecutionState {
        implementation: HashCode::of_str("impl"),
        inputs,
      },
      outputs: vec![PathBuf::from("/ws/out.txt")],
      output_snapshot: OutputSnapshot { files },
      successful: true,
      origin: OriginMetadata {
        build_invocation_id: "build-1".to_string(),
        execution_time_ms: 12,
      },
    }
  }

  #[tokio::test]
  async fn test_in_memory_store() {
    let store = InMemoryExecutionHistoryStore::new();
    assert!(store.load("work").await.unwrap().is_none());

    store.store("work", sample_state()).await.unwrap();
    assert_eq!(store.load("work").await.unwrap(), Some(sample_state()));
    assert_eq!(store.len(), 1);

    store.remove("work").await.unwrap();
    assert!(store.is_empty());
  }

  #[tokio::test]
  async fn test_fs_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("history");

    FsExecutionHistoryStore::new(&root)
      .store("work", sample_state())
      .await
      .unwrap();

    let reopened = FsExecutionHistoryStore::new(&root);
    assert_eq!(reopened.load("work").await.unwrap(), Some(sample_state()));
    assert!(reopened.load("other").await.unwrap().is_none());

    reopened.remove("work").await.unwrap();
    assert!(reopened.load("work").await.unwrap().is_none());
    // removing twice is fine
    reopened.remove("work").await.unwrap();
  }

  #[tokio::test]
  async fn test_fs_store_reports_corrupt_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsExecutionHistoryStore::new(dir.path());
    std::fs::write(store.entry_path("work"), "{ not json").unwrap();

    let err = store.load("work").await.unwrap_err();
    assert!(matches!(err, HistoryError::Corrupt { identity, .. } if identity == "work"));
  }
}
