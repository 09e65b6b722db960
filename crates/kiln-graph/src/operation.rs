//! Build operations: named, described units of work run on a bounded pool.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info_span, instrument};

use crate::error::OperationError;
use crate::events::{NoopNotifier, OperationEvent, OperationNotifier};

/// Category tag for observability tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
  Transform,
  Unspecified,
}

/// How an operation presents itself to tracing and progress reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
  pub display_name: String,
  pub progress_display_name: Option<String>,
  pub category: OperationCategory,
}

impl OperationDescriptor {
  pub fn new(display_name: impl Into<String>) -> Self {
    Self {
      display_name: display_name.into(),
      progress_display_name: None,
      category: OperationCategory::Unspecified,
    }
  }

  /// `Transform <subject> with <transformer>`.
  pub fn transform(subject: &str, transformer: &str) -> Self {
    let basic_name = format!("{subject} with {transformer}");
    Self {
      display_name: format!("Transform {basic_name}"),
      progress_display_name: Some(format!("Transforming {basic_name}")),
      category: OperationCategory::Transform,
    }
  }
}

/// An operation that keeps its own result.
#[async_trait]
pub trait RunnableOperation: Send + Sync {
  fn description(&self) -> OperationDescriptor;

  async fn run(&self);
}

/// Operations collected for a later [`BuildOperationRunner::run_all`].
#[derive(Default)]
pub struct OperationQueue {
  operations: Mutex<Vec<Arc<dyn RunnableOperation>>>,
}

impl OperationQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&self, operation: Arc<dyn RunnableOperation>) {
    let mut operations = self.operations.lock().unwrap_or_else(|e| e.into_inner());
    operations.push(operation);
  }

  pub fn len(&self) -> usize {
    self.operations.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn drain(&self) -> Vec<Arc<dyn RunnableOperation>> {
    let mut operations = self.operations.lock().unwrap_or_else(|e| e.into_inner());
    std::mem::take(&mut *operations)
  }
}

/// Runs build operations with at most `parallelism` running at once.
///
/// Every operation gets a numeric id, a tracing span and started/finished
/// notifier events. Clones share the same pool.
#[derive(Clone)]
pub struct BuildOperationRunner {
  permits: Arc<Semaphore>,
  parallelism: usize,
  notifier: Arc<dyn OperationNotifier>,
  next_id: Arc<AtomicU64>,
}

impl BuildOperationRunner {
  pub fn new(parallelism: usize) -> Result<Self, OperationError> {
    if parallelism == 0 {
      return Err(OperationError::InvalidParallelism(parallelism));
    }
    Ok(Self {
      permits: Arc::new(Semaphore::new(parallelism)),
      parallelism,
      notifier: Arc::new(NoopNotifier),
      next_id: Arc::new(AtomicU64::new(1)),
    })
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn OperationNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn parallelism(&self) -> usize {
    self.parallelism
  }

  /// Run `work` as an operation described by `descriptor`.
  pub async fn call<T, F>(&self, descriptor: OperationDescriptor, work: F) -> Result<T, OperationError>
  where
    F: Future<Output = T> + Send,
  {
    let _permit = self
      .permits
      .acquire()
      .await
      .map_err(|_| OperationError::Closed)?;

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let span = info_span!("build_operation", id, name = %descriptor.display_name);
    self.notifier.notify(OperationEvent::Started {
      id,
      display_name: descriptor.display_name.clone(),
      progress_display_name: descriptor.progress_display_name.clone(),
      category: descriptor.category,
    });

    let started = Instant::now();
    let output = work.instrument(span).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    debug!(id, name = %descriptor.display_name, duration_ms, "build operation finished");
    self.notifier.notify(OperationEvent::Finished {
      id,
      display_name: descriptor.display_name,
      duration_ms,
    });
    Ok(output)
  }

  /// Run a single operation.
  #[instrument(skip_all, fields(name = %operation.description().display_name))]
  pub async fn run(&self, operation: &dyn RunnableOperation) -> Result<(), OperationError> {
    self.call(operation.description(), operation.run()).await
  }

  /// Run every queued operation, concurrently up to the pool size, and
  /// wait for all of them.
  pub async fn run_all(&self, queue: &OperationQueue) -> Result<(), OperationError> {
    let operations = queue.drain();
    if operations.is_empty() {
      return Ok(());
    }
    debug!(operations = operations.len(), "running queued build operations");

    let mut handles = Vec::with_capacity(operations.len());
    for operation in operations {
      let runner = self.clone();
      let name = operation.description().display_name;
      handles.push((
        name,
        tokio::spawn(async move { runner.run(operation.as_ref()).await }),
      ));
    }

    let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = futures::future::join_all(handles).await;
    for (name, result) in names.into_iter().zip(results) {
      result.map_err(|e| OperationError::Join {
        operation: name,
        message: e.to_string(),
      })??;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  use crate::events::ChannelNotifier;

  struct Sleepy {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    done: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl RunnableOperation for Sleepy {
    fn description(&self) -> OperationDescriptor {
      OperationDescriptor::new("sleepy")
    }

    async fn run(&self) {
      let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(20)).await;
      self.running.fetch_sub(1, Ordering::SeqCst);
      self.done.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[test]
  fn test_transform_descriptor() {
    let descriptor = OperationDescriptor::transform("artifact a.jar (org:a:1)", "unzip");
    assert_eq!(descriptor.display_name, "Transform artifact a.jar (org:a:1) with unzip");
    assert_eq!(
      descriptor.progress_display_name.as_deref(),
      Some("Transforming artifact a.jar (org:a:1) with unzip")
    );
    assert_eq!(descriptor.category, OperationCategory::Transform);
  }

  #[test]
  fn test_zero_parallelism_rejected() {
    let err = BuildOperationRunner::new(0).err().unwrap();
    assert_eq!(
      err.to_string(),
      "cannot create executor for requested number of worker threads: 0"
    );
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_run_all_respects_parallelism() {
    let runner = BuildOperationRunner::new(2).unwrap();
    let queue = OperationQueue::new();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..6 {
      queue.add(Arc::new(Sleepy {
        running: running.clone(),
        peak: peak.clone(),
        done: done.clone(),
      }));
    }

    runner.run_all(&queue).await.unwrap();
    assert!(queue.is_empty());
    assert_eq!(done.load(Ordering::SeqCst), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
  }

  #[tokio::test]
  async fn test_events_are_emitted() {
    let (notifier, mut events) = ChannelNotifier::new();
    let runner = BuildOperationRunner::new(1)
      .unwrap()
      .with_notifier(Arc::new(notifier));

    let value = runner
      .call(OperationDescriptor::transform("file a.txt", "copy"), async { 42 })
      .await
      .unwrap();
    assert_eq!(value, 42);

    match events.recv().await.unwrap() {
      OperationEvent::Started {
        id,
        display_name,
        category,
        ..
      } => {
        assert_eq!(id, 1);
        assert_eq!(display_name, "Transform file a.txt with copy");
        assert_eq!(category, OperationCategory::Transform);
      }
      other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
      events.recv().await.unwrap(),
      OperationEvent::Finished { id: 1, .. }
    ));
  }
}
