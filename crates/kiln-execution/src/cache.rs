//! Build cache: reusable outputs keyed by implementation and input fingerprints.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{BeforeExecutionState, OriginMetadata};
use crate::error::CacheError;
use crate::hash::{HashCode, Hasher};

/// Key of a build cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(HashCode);

impl CacheKey {
  /// Implementation hash plus every named input snapshot, in name order.
  pub fn for_inputs(before: &BeforeExecutionState) -> Self {
    let mut hasher = Hasher::new();
    hasher.put_hash(&before.implementation);
    for (name, snapshot) in &before.inputs {
      hasher.put_str(name).put_hash(&snapshot.hash());
    }
    Self(hasher.finish())
  }

  pub fn hash(&self) -> &HashCode {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// A result path recorded in a cache entry.
///
/// Paths are stored relative to the output directory or to the primary
/// input, so the entry can be restored into any workspace for any input
/// location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "location", content = "path", rename_all = "snake_case")]
pub enum CachedPath {
  Workspace(PathBuf),
  PrimaryInput(PathBuf),
}

/// Contents of an output directory plus the result manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub origin: OriginMetadata,
  pub outputs: Vec<CachedPath>,
  pub directories: BTreeSet<PathBuf>,
  pub files: BTreeMap<PathBuf, Vec<u8>>,
}

impl CacheEntry {
  /// Capture `workspace` and the result paths produced into it.
  ///
  /// Fails with `InvalidInput` for a result outside both the workspace and
  /// the primary input; such a result cannot be relocated.
  pub fn capture(
    workspace: &Path,
    primary_input: Option<&Path>,
    outputs: &[PathBuf],
    origin: OriginMetadata,
  ) -> io::Result<Self> {
    let outputs = outputs
      .iter()
      .map(|output| relocatable(workspace, primary_input, output))
      .collect::<io::Result<Vec<_>>>()?;

    let mut directories = BTreeSet::new();
    let mut files = BTreeMap::new();
    if workspace.is_dir() {
      collect_tree(workspace, workspace, &mut directories, &mut files)?;
    }

    Ok(Self {
      origin,
      outputs,
      directories,
      files,
    })
  }

  /// Replace the contents of `workspace` with this entry and return the
  /// result paths resolved against it and `primary_input`.
  pub fn restore(&self, workspace: &Path, primary_input: Option<&Path>) -> io::Result<Vec<PathBuf>> {
    let inside_input = self.outputs.iter().any(|output| matches!(output, CachedPath::PrimaryInput(_)));
    if inside_input && primary_input.is_none() {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "cache entry refers to a primary input but the work has none",
      ));
    }

    if workspace.exists() {
      std::fs::remove_dir_all(workspace)?;
    }
    std::fs::create_dir_all(workspace)?;
    for dir in &self.directories {
      std::fs::create_dir_all(workspace.join(dir))?;
    }
    for (relative, content) in &self.files {
      let target = workspace.join(relative);
      if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(target, content)?;
    }

    Ok(
      self
        .outputs
        .iter()
        .map(|output| match (output, primary_input) {
          (CachedPath::Workspace(relative), _) => join_relative(workspace, relative),
          (CachedPath::PrimaryInput(relative), Some(input)) => join_relative(input, relative),
          (CachedPath::PrimaryInput(relative), None) => relative.clone(),
        })
        .collect(),
    )
  }
}

fn relocatable(workspace: &Path, primary_input: Option<&Path>, output: &Path) -> io::Result<CachedPath> {
  if let Ok(relative) = output.strip_prefix(workspace) {
    return Ok(CachedPath::Workspace(relative.to_path_buf()));
  }
  if let Some(relative) = primary_input.and_then(|input| output.strip_prefix(input).ok()) {
    return Ok(CachedPath::PrimaryInput(relative.to_path_buf()));
  }
  Err(io::Error::new(
    io::ErrorKind::InvalidInput,
    format!("result {} is outside the output directory", output.display()),
  ))
}

fn join_relative(base: &Path, relative: &Path) -> PathBuf {
  if relative.as_os_str().is_empty() {
    base.to_path_buf()
  } else {
    base.join(relative)
  }
}

fn collect_tree(
  root: &Path,
  dir: &Path,
  directories: &mut BTreeSet<PathBuf>,
  files: &mut BTreeMap<PathBuf, Vec<u8>>,
) -> io::Result<()> {
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
    if path.is_dir() {
      directories.insert(relative);
      collect_tree(root, &path, directories, files)?;
    } else {
      files.insert(relative, std::fs::read(&path)?);
    }
  }
  Ok(())
}

/// Shared store of reusable outputs.
#[async_trait]
pub trait BuildCache: Send + Sync {
  async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

  async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError>;
}

#[derive(Default)]
pub struct InMemoryBuildCache {
  entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryBuildCache {
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
impl BuildCache for InMemoryBuildCache {
  async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    Ok(entries.get(key).cloned())
  }

  async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    entries.insert(*key, entry.clone());
    Ok(())
  }
}

/// On-disk manifest of a [`LocalBuildCache`] entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheManifest {
  origin: OriginMetadata,
  outputs: Vec<CachedPath>,
  directories: BTreeSet<PathBuf>,
  files: Vec<PathBuf>,
}

/// Directory-backed cache: `<root>/<key>/manifest.json` plus `<root>/<key>/tree/...`.
#[derive(Debug, Clone)]
pub struct LocalBuildCache {
  root: PathBuf,
}

impl LocalBuildCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

fn cache_io(path: &Path, source: io::Error) -> CacheError {
  CacheError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Write `entry` into `staging` in the [`LocalBuildCache`] layout.
async fn write_staged(staging: &Path, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
  let tree = staging.join("tree");
  tokio::fs::create_dir_all(&tree)
    .await
    .map_err(|e| cache_io(&tree, e))?;
  for dir in &entry.directories {
    let path = tree.join(dir);
    tokio::fs::create_dir_all(&path)
      .await
      .map_err(|e| cache_io(&path, e))?;
  }
  for (relative, content) in &entry.files {
    let path = tree.join(relative);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| cache_io(parent, e))?;
    }
    tokio::fs::write(&path, content)
      .await
      .map_err(|e| cache_io(&path, e))?;
  }

  let manifest = CacheManifest {
    origin: entry.origin.clone(),
    outputs: entry.outputs.clone(),
    directories: entry.directories.clone(),
    files: entry.files.keys().cloned().collect(),
  };
  let manifest_path = staging.join("manifest.json");
  let content = serde_json::to_vec_pretty(&manifest).map_err(|e| CacheError::Corrupt {
    key: key.to_string(),
    message: e.to_string(),
  })?;
  tokio::fs::write(&manifest_path, content)
    .await
    .map_err(|e| cache_io(&manifest_path, e))
}

#[async_trait]
impl BuildCache for LocalBuildCache {
  async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
    let entry_dir = self.root.join(key.to_string());
    let manifest_path = entry_dir.join("manifest.json");
    let content = match tokio::fs::read(&manifest_path).await {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(cache_io(&manifest_path, e)),
    };
    let manifest: CacheManifest =
      serde_json::from_slice(&content).map_err(|e| CacheError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
      })?;

    let tree = entry_dir.join("tree");
    let mut files = BTreeMap::new();
    for relative in manifest.files {
      let path = tree.join(&relative);
      let content = tokio::fs::read(&path).await.map_err(|e| cache_io(&path, e))?;
      files.insert(relative, content);
    }

    Ok(Some(CacheEntry {
      origin: manifest.origin,
      outputs: manifest.outputs,
      directories: manifest.directories,
      files,
    }))
  }

  async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
    let entry_dir = self.root.join(key.to_string());
    if tokio::fs::try_exists(&entry_dir).await.unwrap_or(false) {
      return Ok(());
    }

    // Stage under a unique name, then move into place in one rename.
    let staging = self
      .root
      .join(format!(".staging-{}", uuid::Uuid::new_v4()));
    if let Err(e) = write_staged(&staging, key, entry).await {
      let _ = tokio::fs::remove_dir_all(&staging).await;
      return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&staging, &entry_dir).await {
      let _ = tokio::fs::remove_dir_all(&staging).await;
      // Another writer stored the same key first.
      if tokio::fs::try_exists(&entry_dir).await.unwrap_or(false) {
        return Ok(());
      }
      return Err(cache_io(&entry_dir, e));
    }
    Ok(())
  }
}
