//! Runs transformers through the execution pipeline.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiln_execution::{
  ExecutionError, ExecutionServices, FileSnapshot, FileSystemSnapshotter, HashCode, Hasher,
  UnitOfWork, WorkExecutor, WorkspaceProvider,
};
use kiln_transform::{ArtifactDependencies, Transformer};
use tokio::sync::OnceCell;
use tracing::debug;

/// One transformer applied to one primary input, as a unit of work.
pub struct TransformerExecution {
  identity: String,
  display_name: String,
  transformer: Arc<dyn Transformer>,
  primary_input: PathBuf,
  workspace: PathBuf,
  dependencies: Arc<dyn ArtifactDependencies>,
  timeout: Option<Duration>,
}

impl UnitOfWork for TransformerExecution {
  fn identity(&self) -> &str {
    &self.identity
  }

  fn display_name(&self) -> String {
    self.display_name.clone()
  }

  fn implementation_hash(&self) -> HashCode {
    self.transformer.identity_hash()
  }

  fn snapshot_inputs(
    &self,
    snapshotter: &FileSystemSnapshotter,
  ) -> Result<BTreeMap<String, FileSnapshot>, ExecutionError> {
    let mut inputs = BTreeMap::new();
    inputs.insert(
      primary_input_name(&self.primary_input),
      snapshotter.snapshot_for_execution(&self.primary_input)?,
    );

    // Dependencies are only resolved when the transformer reads them.
    if self.transformer.requires_dependencies() {
      let files = self
        .dependencies
        .files()
        .map_err(|source| ExecutionError::Invocation {
          work: self.display_name.clone(),
          source,
        })?;
      for file in files {
        let snapshot = snapshotter.snapshot_for_execution(&file)?;
        inputs.insert(format!("dependency {}", file.display()), snapshot);
      }
    }
    Ok(inputs)
  }

  fn output_directory(&self) -> &Path {
    &self.workspace
  }

  fn primary_input(&self) -> Option<&Path> {
    Some(&self.primary_input)
  }

  fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  fn execute(&self) -> Result<Vec<PathBuf>, ExecutionError> {
    // Start from an empty workspace so stale outputs never leak through.
    let reset = std::fs::remove_dir_all(&self.workspace)
      .or_else(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Ok(()),
        _ => Err(e),
      })
      .and_then(|_| std::fs::create_dir_all(&self.workspace));
    if let Err(source) = reset {
      return Err(ExecutionError::OutputDirectory {
        path: self.workspace.clone(),
        source,
      });
    }

    self
      .transformer
      .transform(&self.primary_input, &self.workspace, self.dependencies.as_ref())
      .map_err(|e| ExecutionError::Invocation {
        work: self.display_name.clone(),
        source: Box::new(e),
      })
  }
}

/// Input name recorded for the primary input.
///
/// The file name is part of the fingerprint: transforms name their outputs
/// after it, so equal content under another name is different work.
fn primary_input_name(primary_input: &Path) -> String {
  match primary_input.file_name() {
    Some(name) => format!("primary {}", name.to_string_lossy()),
    None => "primary".to_string(),
  }
}

/// `(transformer identity, primary input path, primary input snapshot)`.
type ResultKey = (HashCode, PathBuf, HashCode);

/// Invokes transformers through a [`WorkExecutor`] and remembers results
/// for the rest of the build.
///
/// Concurrent invocations for the same result key run the work once; the
/// others wait for it.
pub struct TransformerInvoker {
  executor: WorkExecutor,
  snapshotter: Arc<FileSystemSnapshotter>,
  workspaces: Arc<dyn WorkspaceProvider>,
  timeout: Option<Duration>,
  results: Mutex<HashMap<ResultKey, Arc<OnceCell<Vec<PathBuf>>>>>,
}

impl TransformerInvoker {
  pub fn new(
    executor: WorkExecutor,
    snapshotter: Arc<FileSystemSnapshotter>,
    workspaces: Arc<dyn WorkspaceProvider>,
  ) -> Self {
    Self {
      executor,
      snapshotter,
      workspaces,
      timeout: None,
      results: Mutex::new(HashMap::new()),
    }
  }

  /// An invoker sharing the snapshotter of `services`.
  pub fn from_services(services: &ExecutionServices, workspaces: Arc<dyn WorkspaceProvider>) -> Self {
    Self::new(
      services.create_work_executor(),
      services.snapshotter().clone(),
      workspaces,
    )
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  fn result_key(&self, transformer: &dyn Transformer, primary_input: &Path) -> Result<(ResultKey, FileSnapshot), ExecutionError> {
    let snapshot = self.snapshotter.snapshot_for_execution(primary_input)?;
    let key = (transformer.identity_hash(), primary_input.to_path_buf(), snapshot.hash());
    Ok((key, snapshot))
  }

  fn cell(&self, key: ResultKey) -> Arc<OnceCell<Vec<PathBuf>>> {
    let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
    results.entry(key).or_default().clone()
  }

  /// The result of an earlier invocation in this build, if any.
  pub fn cached_result(&self, transformer: &dyn Transformer, primary_input: &Path) -> Option<Vec<PathBuf>> {
    let (key, _) = self.result_key(transformer, primary_input).ok()?;
    let results = self.results.lock().unwrap_or_else(|e| e.into_inner());
    results.get(&key).and_then(|cell| cell.get().cloned())
  }

  pub fn has_cached_result(&self, transformer: &dyn Transformer, primary_input: &Path) -> bool {
    self.cached_result(transformer, primary_input).is_some()
  }

  /// Transform `primary_input`, reusing a result from this build, the
  /// execution history or the build cache where possible.
  pub async fn invoke(
    &self,
    transformer: Arc<dyn Transformer>,
    primary_input: &Path,
    dependencies: Arc<dyn ArtifactDependencies>,
  ) -> Result<Vec<PathBuf>, ExecutionError> {
    let (key, snapshot) = self.result_key(transformer.as_ref(), primary_input)?;
    let identity_hash = key.0;
    let cell = self.cell(key);

    let files = cell
      .get_or_try_init(|| async {
        let workspace_key = Hasher::new()
          .put_hash(&identity_hash)
          .put_str(&primary_input.to_string_lossy())
          .put_hash(&snapshot.hash())
          .finish();
        let work = TransformerExecution {
          identity: workspace_key.to_hex(),
          display_name: format!("{} on {}", transformer.display_name(), primary_input.display()),
          transformer: transformer.clone(),
          primary_input: primary_input.to_path_buf(),
          workspace: self.workspaces.workspace(&workspace_key),
          dependencies,
          timeout: self.timeout,
        };

        let result = self.executor.execute(Arc::new(work)).await;
        result.outcome.map(|output| {
          debug!(
            transformer = %transformer.display_name(),
            input = %primary_input.display(),
            outcome = ?output.outcome,
            "transform result available"
          );
          output.files
        })
      })
      .await?;
    Ok(files.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use kiln_execution::{DirWorkspaceProvider, InMemoryExecutionHistoryStore};
  use kiln_transform::{NoDependencies, builtin_transformer};
  use serde_json::json;

  #[tokio::test]
  async fn test_invoke_caches_result_for_build() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.txt");
    std::fs::write(&input, "alpha").unwrap();

    let services = ExecutionServices::new(Arc::new(InMemoryExecutionHistoryStore::new()));
    let invoker = TransformerInvoker::from_services(
      &services,
      Arc::new(DirWorkspaceProvider::new(dir.path().join("workspaces"))),
    );
    let transformer = builtin_transformer("copy", &json!({})).unwrap();

    assert!(!invoker.has_cached_result(transformer.as_ref(), &input));
    let files = invoker
      .invoke(transformer.clone(), &input, Arc::new(NoDependencies))
      .await
      .unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("a.txt"));
    assert!(files[0].starts_with(dir.path().join("workspaces")));
    assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "alpha");

    assert_eq!(invoker.cached_result(transformer.as_ref(), &input), Some(files));
  }

  #[tokio::test]
  async fn test_failed_invocation_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let services = ExecutionServices::new(Arc::new(InMemoryExecutionHistoryStore::new()));
    let invoker = TransformerInvoker::from_services(
      &services,
      Arc::new(DirWorkspaceProvider::new(dir.path().join("workspaces"))),
    );
    let transformer = builtin_transformer("checksum", &json!({})).unwrap();
    // a directory cannot be checksummed
    let input = dir.path().join("classes");
    std::fs::create_dir_all(&input).unwrap();

    let err = invoker
      .invoke(transformer.clone(), &input, Arc::new(NoDependencies))
      .await
      .unwrap_err();
    assert!(matches!(err, ExecutionError::Invocation { .. }));
    assert!(!invoker.has_cached_result(transformer.as_ref(), &input));
  }
}
