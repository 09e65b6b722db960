//! Wiring for the execution pipeline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::BuildCache;
use crate::executor::WorkExecutor;
use crate::history::ExecutionHistoryStore;
use crate::outputs::{
  CompositeOutputChangeListener, InMemoryOutputFilesRepository, OutputChangeListener,
  OutputFilesRepository, OutputLocks,
};
use crate::snapshot::FileSystemSnapshotter;
use crate::steps::{
  CacheStep, CancelExecutionStep, CatchExceptionStep, CreateOutputsStep, ExecuteStep,
  PrepareCachingStep, SkipUpToDateStep, SnapshotOutputStep, Step, StoreSnapshotsStep, TimeoutStep,
};

/// Build-scoped services the pipeline is composed from.
///
/// # Usage
///
/// ```ignore
/// let services = ExecutionServices::new(Arc::new(InMemoryExecutionHistoryStore::new()))
///   .with_build_cache(Arc::new(InMemoryBuildCache::new()))
///   .with_cancellation(cancel.clone());
/// let executor = services.create_work_executor();
/// let result = executor.execute(work).await;
/// ```
pub struct ExecutionServices {
  build_invocation_id: String,
  history: Arc<dyn ExecutionHistoryStore>,
  build_cache: Option<Arc<dyn BuildCache>>,
  output_files: Arc<dyn OutputFilesRepository>,
  snapshotter: Arc<FileSystemSnapshotter>,
  extra_listeners: Vec<Arc<dyn OutputChangeListener>>,
  output_locks: Arc<OutputLocks>,
  cancel: CancellationToken,
}

impl ExecutionServices {
  pub fn new(history: Arc<dyn ExecutionHistoryStore>) -> Self {
    Self {
      build_invocation_id: uuid::Uuid::new_v4().to_string(),
      history,
      build_cache: None,
      output_files: Arc::new(InMemoryOutputFilesRepository::new()),
      snapshotter: Arc::new(FileSystemSnapshotter::new()),
      extra_listeners: Vec::new(),
      output_locks: Arc::new(OutputLocks::new()),
      cancel: CancellationToken::new(),
    }
  }

  pub fn with_build_cache(mut self, build_cache: Arc<dyn BuildCache>) -> Self {
    self.build_cache = Some(build_cache);
    self
  }

  pub fn with_output_files(mut self, output_files: Arc<dyn OutputFilesRepository>) -> Self {
    self.output_files = output_files;
    self
  }

  pub fn with_snapshotter(mut self, snapshotter: Arc<FileSystemSnapshotter>) -> Self {
    self.snapshotter = snapshotter;
    self
  }

  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  /// Also notify `listener` before any output location is written.
  pub fn with_output_change_listener(mut self, listener: Arc<dyn OutputChangeListener>) -> Self {
    self.extra_listeners.push(listener);
    self
  }

  pub fn build_invocation_id(&self) -> &str {
    &self.build_invocation_id
  }

  pub fn snapshotter(&self) -> &Arc<FileSystemSnapshotter> {
    &self.snapshotter
  }

  pub fn output_files(&self) -> &Arc<dyn OutputFilesRepository> {
    &self.output_files
  }

  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  /// Locks shared by every step that writes an output directory.
  pub fn output_locks(&self) -> &Arc<OutputLocks> {
    &self.output_locks
  }

  fn output_change_listener(&self) -> Arc<dyn OutputChangeListener> {
    let snapshotter: Arc<dyn OutputChangeListener> = self.snapshotter.clone();
    let mut listener = CompositeOutputChangeListener::new(vec![snapshotter]);
    for extra in &self.extra_listeners {
      listener.push(extra.clone());
    }
    Arc::new(listener)
  }

  /// Compose the pipeline, innermost step first.
  pub fn create_work_executor(&self) -> WorkExecutor {
    let listener = self.output_change_listener();

    let step: Arc<dyn Step> = Arc::new(ExecuteStep::new(listener.clone(), self.output_locks.clone()));
    let step = Arc::new(CancelExecutionStep::new(self.cancel.clone(), step));
    let step = Arc::new(TimeoutStep::new(step));
    let step = Arc::new(CatchExceptionStep::new(step));
    let step = Arc::new(CreateOutputsStep::new(step));
    let step = Arc::new(SnapshotOutputStep::new(
      self.build_invocation_id.clone(),
      self.snapshotter.clone(),
      step,
    ));
    let step = Arc::new(CacheStep::new(
      self.build_cache.clone(),
      listener,
      self.output_locks.clone(),
      self.snapshotter.clone(),
      step,
    ));
    let step = Arc::new(PrepareCachingStep::new(step));
    let step = Arc::new(StoreSnapshotsStep::new(
      self.build_invocation_id.clone(),
      self.history.clone(),
      self.output_files.clone(),
      step,
    ));
    let step = Arc::new(SkipUpToDateStep::new(
      self.history.clone(),
      self.snapshotter.clone(),
      step,
    ));

    WorkExecutor::new(step)
  }
}
