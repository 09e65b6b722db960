use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Step;
use crate::context::{Context, StepResult};
use crate::error::ExecutionError;

/// Fails fast when the build is cancelled, before or while the work runs.
///
/// Work already running on the blocking pool is not preempted; the step only
/// stops waiting for it.
pub struct CancelExecutionStep {
  cancel: CancellationToken,
  next: Arc<dyn Step>,
}

impl CancelExecutionStep {
  pub fn new(cancel: CancellationToken, next: Arc<dyn Step>) -> Self {
    Self { cancel, next }
  }
}

#[async_trait]
impl Step for CancelExecutionStep {
  async fn execute(&self, context: Context) -> StepResult {
    let work = context.work.display_name();
    if self.cancel.is_cancelled() {
      info!(work = %work, "build cancelled before execution");
      return StepResult::failed(ExecutionError::Cancelled { work });
    }

    tokio::select! {
      _ = self.cancel.cancelled() => {
        info!(work = %work, "build cancelled during execution");
        StepResult::failed(ExecutionError::Cancelled { work })
      }
      result = self.next.execute(context) => result,
    }
  }
}
