use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use super::Step;
use crate::context::{Context, StepResult};
use crate::error::ExecutionError;

/// Turns a panic anywhere below into a failed result.
pub struct CatchExceptionStep {
  next: Arc<dyn Step>,
}

impl CatchExceptionStep {
  pub fn new(next: Arc<dyn Step>) -> Self {
    Self { next }
  }
}

#[async_trait]
impl Step for CatchExceptionStep {
  async fn execute(&self, context: Context) -> StepResult {
    let work = context.work.display_name();
    match AssertUnwindSafe(self.next.execute(context))
      .catch_unwind()
      .await
    {
      Ok(result) => result,
      Err(payload) => {
        let message = panic_message(payload.as_ref());
        error!(work = %work, message = %message, "work panicked");
        StepResult::failed(ExecutionError::Panicked { work, message })
      }
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}
