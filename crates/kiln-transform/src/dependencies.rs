//! Upstream dependency files handed to a transform.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use kiln_execution::BoxError;

/// Supplies the files of a transform's upstream dependencies.
///
/// Implementations may compute the list on demand; a transform that never
/// asks for its dependencies never pays for resolving them.
pub trait ArtifactDependencies: Send + Sync {
  fn files(&self) -> Result<Vec<PathBuf>, BoxError>;
}

/// No upstream dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

impl ArtifactDependencies for NoDependencies {
  fn files(&self) -> Result<Vec<PathBuf>, BoxError> {
    Ok(Vec::new())
  }
}

/// A dependency list known up front.
#[derive(Debug, Clone, Default)]
pub struct FixedDependencies(pub Vec<PathBuf>);

impl ArtifactDependencies for FixedDependencies {
  fn files(&self) -> Result<Vec<PathBuf>, BoxError> {
    Ok(self.0.clone())
  }
}

type Supplier = Box<dyn Fn() -> Result<Vec<PathBuf>, BoxError> + Send + Sync>;

/// Computes the dependency list on first access and remembers it.
pub struct LazyDependencies {
  supplier: Supplier,
  files: OnceLock<Result<Vec<PathBuf>, Arc<str>>>,
}

impl LazyDependencies {
  pub fn new(supplier: impl Fn() -> Result<Vec<PathBuf>, BoxError> + Send + Sync + 'static) -> Self {
    Self {
      supplier: Box::new(supplier),
      files: OnceLock::new(),
    }
  }

  pub fn is_resolved(&self) -> bool {
    self.files.get().is_some()
  }
}

impl ArtifactDependencies for LazyDependencies {
  fn files(&self) -> Result<Vec<PathBuf>, BoxError> {
    let files = self
      .files
      .get_or_init(|| (self.supplier)().map_err(|e| Arc::from(e.to_string())));
    match files {
      Ok(files) => Ok(files.clone()),
      Err(message) => Err(message.to_string().into()),
    }
  }
}

impl fmt::Debug for LazyDependencies {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LazyDependencies")
      .field("resolved", &self.is_resolved())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn test_lazy_dependencies_resolve_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let deps = LazyDependencies::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(vec![PathBuf::from("/deps/a.jar")])
    });

    assert!(!deps.is_resolved());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(deps.files().unwrap(), vec![PathBuf::from("/deps/a.jar")]);
    assert_eq!(deps.files().unwrap(), vec![PathBuf::from("/deps/a.jar")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_lazy_dependencies_remember_failure() {
    let deps = LazyDependencies::new(|| Err("unresolvable".into()));
    assert_eq!(deps.files().unwrap_err().to_string(), "unresolvable");
    assert_eq!(deps.files().unwrap_err().to_string(), "unresolvable");
  }
}
