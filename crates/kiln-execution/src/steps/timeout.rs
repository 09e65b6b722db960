use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::Step;
use crate::context::{Context, StepResult};
use crate::error::ExecutionError;

/// Fails work that exceeds its wall-clock budget.
pub struct TimeoutStep {
  next: Arc<dyn Step>,
}

impl TimeoutStep {
  pub fn new(next: Arc<dyn Step>) -> Self {
    Self { next }
  }
}

#[async_trait]
impl Step for TimeoutStep {
  async fn execute(&self, context: Context) -> StepResult {
    let Some(timeout) = context.work.timeout() else {
      return self.next.execute(context).await;
    };

    let work = context.work.display_name();
    match tokio::time::timeout(timeout, self.next.execute(context)).await {
      Ok(result) => result,
      Err(_) => {
        warn!(work = %work, timeout_ms = timeout.as_millis() as u64, "work timed out");
        StepResult::failed(ExecutionError::Timeout { work, timeout })
      }
    }
  }
}
