use std::sync::Arc;

use async_trait::async_trait;

use super::Step;
use crate::context::{Context, StepResult};
use crate::error::ExecutionError;

/// Ensures the output directory exists before the work runs.
pub struct CreateOutputsStep {
  next: Arc<dyn Step>,
}

impl CreateOutputsStep {
  pub fn new(next: Arc<dyn Step>) -> Self {
    Self { next }
  }
}

#[async_trait]
impl Step for CreateOutputsStep {
  async fn execute(&self, context: Context) -> StepResult {
    let dir = context.work.output_directory().to_path_buf();
    if let Err(source) = tokio::fs::create_dir_all(&dir).await {
      return StepResult::failed(ExecutionError::OutputDirectory { path: dir, source });
    }
    self.next.execute(context).await
  }
}
