use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Step;
use crate::cache::{BuildCache, CacheEntry, CacheKey};
use crate::context::{Context, StepResult};
use crate::outputs::{OutputChangeListener, OutputLocks};
use crate::snapshot::{FileSystemSnapshotter, OutputSnapshot};
use crate::work::{ExecutionOutcome, WorkOutput};

/// Loads outputs from the build cache, or stores them after execution.
///
/// Cache failures never fail the work: a broken load is a miss and a broken
/// store is skipped.
pub struct CacheStep {
  build_cache: Option<Arc<dyn BuildCache>>,
  output_change_listener: Arc<dyn OutputChangeListener>,
  output_locks: Arc<OutputLocks>,
  snapshotter: Arc<FileSystemSnapshotter>,
  next: Arc<dyn Step>,
}

impl CacheStep {
  pub fn new(
    build_cache: Option<Arc<dyn BuildCache>>,
    output_change_listener: Arc<dyn OutputChangeListener>,
    output_locks: Arc<OutputLocks>,
    snapshotter: Arc<FileSystemSnapshotter>,
    next: Arc<dyn Step>,
  ) -> Self {
    Self {
      build_cache,
      output_change_listener,
      output_locks,
      snapshotter,
      next,
    }
  }

  async fn load(&self, cache: &dyn BuildCache, key: &CacheKey, context: &Context) -> Option<StepResult> {
    let entry = match cache.load(key).await {
      Ok(Some(entry)) => entry,
      Ok(None) => {
        debug!(work = %context.work.display_name(), key = %key, "build cache miss");
        return None;
      }
      Err(e) => {
        warn!(work = %context.work.display_name(), key = %key, error = %e, "failed to load from build cache");
        return None;
      }
    };

    let restored = {
      let entry = entry.clone();
      let work = context.work.clone();
      let listener = self.output_change_listener.clone();
      let lock = self.output_locks.lock_for(work.output_directory());
      tokio::task::spawn_blocking(move || {
        let _guard = lock.acquire();
        let workspace = work.output_directory().to_path_buf();
        listener.before_output_change(std::slice::from_ref(&workspace));
        entry.restore(&workspace, work.primary_input())
      })
      .await
    };
    let files = match restored {
      Ok(Ok(files)) => files,
      Ok(Err(e)) => {
        warn!(work = %context.work.display_name(), key = %key, error = %e, "failed to restore outputs from build cache");
        return None;
      }
      Err(e) => {
        warn!(work = %context.work.display_name(), key = %key, error = %e, "build cache restore task failed");
        return None;
      }
    };

    let snapshot = match OutputSnapshot::capture(&self.snapshotter, &files) {
      Ok(snapshot) => snapshot,
      Err(e) => return Some(StepResult::failed(e)),
    };

    info!(
      work = %context.work.display_name(),
      key = %key,
      origin = %entry.origin.build_invocation_id,
      "outputs loaded from build cache"
    );
    Some(StepResult {
      outcome: Ok(WorkOutput {
        outcome: ExecutionOutcome::FromCache,
        files,
      }),
      output_snapshot: Some(snapshot),
      origin: Some(entry.origin),
    })
  }

  async fn store(&self, cache: &dyn BuildCache, key: &CacheKey, context: &Context, result: &StepResult) {
    let (Ok(output), Some(origin)) = (&result.outcome, &result.origin) else {
      return;
    };
    if output.outcome != ExecutionOutcome::Executed {
      return;
    }

    let work = context.work.clone();
    let lock = self.output_locks.lock_for(work.output_directory());
    let files = output.files.clone();
    let origin = origin.clone();
    let captured = tokio::task::spawn_blocking(move || {
      let _guard = lock.acquire();
      CacheEntry::capture(work.output_directory(), work.primary_input(), &files, origin)
    })
    .await;
    let entry = match captured {
      Ok(Ok(entry)) => entry,
      Ok(Err(e)) => {
        warn!(work = %context.work.display_name(), key = %key, error = %e, "failed to capture outputs for build cache");
        return;
      }
      Err(e) => {
        warn!(work = %context.work.display_name(), key = %key, error = %e, "build cache capture task failed");
        return;
      }
    };

    match cache.store(key, &entry).await {
      Ok(()) => debug!(work = %context.work.display_name(), key = %key, "outputs stored in build cache"),
      Err(e) => warn!(work = %context.work.display_name(), key = %key, error = %e, "failed to store in build cache"),
    }
  }
}

#[async_trait]
impl Step for CacheStep {
  async fn execute(&self, context: Context) -> StepResult {
    let (Some(cache), Some(key)) = (self.build_cache.clone(), context.cache_key) else {
      return self.next.execute(context).await;
    };

    if let Some(result) = self.load(cache.as_ref(), &key, &context).await {
      return result;
    }

    let result = self.next.execute(context.clone()).await;
    self.store(cache.as_ref(), &key, &context, &result).await;
    result
  }
}
