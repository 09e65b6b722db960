//! File system snapshots.
//!
//! A [`FileSnapshot`] is the content fingerprint of a single location: a
//! regular file is hashed by content, a directory by the sorted list of its
//! descendants (relative path, kind and content). Snapshots are cached per
//! build by the [`FileSystemSnapshotter`]; the cache is invalidated for any
//! location announced through [`OutputChangeListener`] before it is written.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ExecutionError;
use crate::hash::{HashCode, Hasher};
use crate::outputs::OutputChangeListener;

/// Fingerprint of a location on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileSnapshot {
  Missing,
  RegularFile { hash: HashCode },
  Directory { hash: HashCode },
}

impl FileSnapshot {
  pub fn exists(&self) -> bool {
    !matches!(self, Self::Missing)
  }

  /// Hash identifying both kind and content.
  pub fn hash(&self) -> HashCode {
    let mut hasher = Hasher::new();
    match self {
      Self::Missing => hasher.put_str("missing"),
      Self::RegularFile { hash } => hasher.put_str("file").put_hash(hash),
      Self::Directory { hash } => hasher.put_str("dir").put_hash(hash),
    };
    hasher.finish()
  }
}

/// Snapshots of a set of produced output files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSnapshot {
  pub files: BTreeMap<PathBuf, FileSnapshot>,
}

impl OutputSnapshot {
  pub fn capture(
    snapshotter: &FileSystemSnapshotter,
    files: &[PathBuf],
  ) -> Result<Self, ExecutionError> {
    let mut snapshots = BTreeMap::new();
    for file in files {
      snapshots.insert(file.clone(), snapshotter.snapshot_for_execution(file)?);
    }
    Ok(Self { files: snapshots })
  }
}

/// Computes and caches [`FileSnapshot`]s.
pub struct FileSystemSnapshotter {
  cache: RwLock<HashMap<PathBuf, FileSnapshot>>,
}

impl FileSystemSnapshotter {
  pub fn new() -> Self {
    Self {
      cache: RwLock::new(HashMap::new()),
    }
  }

  /// Snapshot a location, reusing a cached snapshot when one is present.
  pub fn snapshot(&self, path: &Path) -> io::Result<FileSnapshot> {
    {
      let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
      if let Some(snapshot) = cache.get(path) {
        return Ok(*snapshot);
      }
    }

    let snapshot = compute_snapshot(path)?;
    trace!(path = %path.display(), snapshot = ?snapshot, "snapshot computed");

    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    cache.insert(path.to_path_buf(), snapshot);
    Ok(snapshot)
  }

  /// Like [`snapshot`](Self::snapshot), with the error mapped for the pipeline.
  pub fn snapshot_for_execution(&self, path: &Path) -> Result<FileSnapshot, ExecutionError> {
    self
      .snapshot(path)
      .map_err(|source| ExecutionError::Snapshot {
        path: path.to_path_buf(),
        source,
      })
  }

  /// Drop cached snapshots for every location at or below one of `roots`.
  pub fn invalidate(&self, roots: &[PathBuf]) {
    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    cache.retain(|path, _| {
      !roots
        .iter()
        .any(|root| path.starts_with(root) || root.starts_with(path))
    });
  }

  pub fn invalidate_all(&self) {
    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    cache.clear();
  }
}

impl Default for FileSystemSnapshotter {
  fn default() -> Self {
    Self::new()
  }
}

impl OutputChangeListener for FileSystemSnapshotter {
  fn before_output_change(&self, affected: &[PathBuf]) {
    self.invalidate(affected);
  }
}

fn compute_snapshot(path: &Path) -> io::Result<FileSnapshot> {
  let metadata = match fs::metadata(path) {
    Ok(metadata) => metadata,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileSnapshot::Missing),
    Err(e) => return Err(e),
  };

  if metadata.is_dir() {
    let mut hasher = Hasher::new();
    hash_tree(path, path, &mut hasher)?;
    Ok(FileSnapshot::Directory {
      hash: hasher.finish(),
    })
  } else {
    Ok(FileSnapshot::RegularFile {
      hash: hash_file(path)?,
    })
  }
}

fn hash_file(path: &Path) -> io::Result<HashCode> {
  let mut hasher = blake3::Hasher::new();
  let mut file = fs::File::open(path)?;
  io::copy(&mut file, &mut hasher)?;
  Ok(hasher.finalize().into())
}

fn hash_tree(root: &Path, dir: &Path, hasher: &mut Hasher) -> io::Result<()> {
  let mut entries = fs::read_dir(dir)?
    .map(|entry| entry.map(|e| e.path()))
    .collect::<io::Result<Vec<_>>>()?;
  entries.sort();

  for entry in entries {
    let relative = entry.strip_prefix(root).unwrap_or(&entry);
    hasher.put_str(&relative.to_string_lossy());
    if entry.is_dir() {
      hasher.put_str("dir");
      hash_tree(root, &entry, hasher)?;
    } else {
      hasher.put_str("file").put_hash(&hash_file(&entry)?);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let snapshotter = FileSystemSnapshotter::new();
    let snapshot = snapshotter.snapshot(&dir.path().join("nope")).unwrap();
    assert_eq!(snapshot, FileSnapshot::Missing);
    assert!(!snapshot.exists());
  }

  #[test]
  fn test_file_hash_follows_content() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "same").unwrap();
    fs::write(&b, "same").unwrap();

    let snapshotter = FileSystemSnapshotter::new();
    assert_eq!(snapshotter.snapshot(&a).unwrap(), snapshotter.snapshot(&b).unwrap());

    fs::write(&b, "different").unwrap();
    snapshotter.invalidate(&[b.clone()]);
    assert_ne!(snapshotter.snapshot(&a).unwrap(), snapshotter.snapshot(&b).unwrap());
  }

  #[test]
  fn test_directory_hash_sees_nested_changes() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("out/nested");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("x.bin"), "1").unwrap();

    let snapshotter = FileSystemSnapshotter::new();
    let root = dir.path().join("out");
    let before = snapshotter.snapshot(&root).unwrap();
    assert!(matches!(before, FileSnapshot::Directory { .. }));

    fs::write(nested.join("x.bin"), "2").unwrap();
    // cached until invalidated
    assert_eq!(snapshotter.snapshot(&root).unwrap(), before);

    snapshotter.before_output_change(&[nested.join("x.bin")]);
    assert_ne!(snapshotter.snapshot(&root).unwrap(), before);
  }

  #[test]
  fn test_kind_is_part_of_hash() {
    let hash = HashCode::of_str("x");
    assert_ne!(
      FileSnapshot::RegularFile { hash }.hash(),
      FileSnapshot::Directory { hash }.hash()
    );
  }
}
