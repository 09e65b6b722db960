//! Output bookkeeping shared across executions.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Notified immediately before a unit of work writes to its outputs.
///
/// Components that cache state about output locations (snapshots, file
/// watchers) drop that state here so a reader never sees a half-written
/// directory as already snapshotted.
pub trait OutputChangeListener: Send + Sync {
  fn before_output_change(&self, affected: &[PathBuf]);
}

/// Fans one notification out to several listeners.
#[derive(Clone, Default)]
pub struct CompositeOutputChangeListener {
  listeners: Vec<Arc<dyn OutputChangeListener>>,
}

impl CompositeOutputChangeListener {
  pub fn new(listeners: Vec<Arc<dyn OutputChangeListener>>) -> Self {
    Self { listeners }
  }

  pub fn push(&mut self, listener: Arc<dyn OutputChangeListener>) {
    self.listeners.push(listener);
  }
}

impl OutputChangeListener for CompositeOutputChangeListener {
  fn before_output_change(&self, affected: &[PathBuf]) {
    for listener in &self.listeners {
      listener.before_output_change(affected);
    }
  }
}

/// One lock per output directory, held by whoever is writing into it.
///
/// Blocking writers keep their lock until they return, even after the
/// pipeline stopped waiting for them on a timeout or cancellation. A later
/// writer of the same directory waits for the abandoned one to finish.
#[derive(Default)]
pub struct OutputLocks {
  locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl OutputLocks {
  pub fn new() -> Self {
    Self::default()
  }

  /// The lock guarding `directory`. Acquire it on a blocking thread.
  pub fn lock_for(&self, directory: &Path) -> OutputLock {
    let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
    OutputLock(locks.entry(directory.to_path_buf()).or_default().clone())
  }

  /// Whether some writer currently holds the lock for `directory`.
  pub fn is_locked(&self, directory: &Path) -> bool {
    let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
    locks
      .get(directory)
      .is_some_and(|lock| matches!(lock.try_lock(), Err(std::sync::TryLockError::WouldBlock)))
  }
}

/// Handle to one directory's lock; see [`OutputLocks`].
#[derive(Clone)]
pub struct OutputLock(Arc<Mutex<()>>);

impl OutputLock {
  /// Block until the directory is free. A writer that panicked still
  /// releases it.
  pub fn acquire(&self) -> MutexGuard<'_, ()> {
    self.0.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Remembers which locations were produced by the build.
///
/// Lets other components tell build output apart from source files.
pub trait OutputFilesRepository: Send + Sync {
  /// Whether `path` is, or lives under, a recorded output location.
  fn is_generated_by_build(&self, path: &Path) -> bool;

  fn record_output_files(&self, paths: &[PathBuf]);
}

#[derive(Default)]
pub struct InMemoryOutputFilesRepository {
  roots: RwLock<BTreeSet<PathBuf>>,
}

impl InMemoryOutputFilesRepository {
  pub fn new() -> Self {
    Self::default()
  }
}

impl OutputFilesRepository for InMemoryOutputFilesRepository {
  fn is_generated_by_build(&self, path: &Path) -> bool {
    let roots = self.roots.read().unwrap_or_else(|e| e.into_inner());
    path.ancestors().any(|ancestor| roots.contains(ancestor))
  }

  fn record_output_files(&self, paths: &[PathBuf]) {
    let mut roots = self.roots.write().unwrap_or_else(|e| e.into_inner());
    roots.extend(paths.iter().cloned());
  }
}
