use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::Step;
use crate::context::{Context, OriginMetadata, StepResult};
use crate::snapshot::{FileSystemSnapshotter, OutputSnapshot};
use crate::work::ExecutionOutcome;

/// Snapshots the produced outputs and stamps the result's origin.
pub struct SnapshotOutputStep {
  build_invocation_id: String,
  snapshotter: Arc<FileSystemSnapshotter>,
  next: Arc<dyn Step>,
}

impl SnapshotOutputStep {
  pub fn new(
    build_invocation_id: impl Into<String>,
    snapshotter: Arc<FileSystemSnapshotter>,
    next: Arc<dyn Step>,
  ) -> Self {
    Self {
      build_invocation_id: build_invocation_id.into(),
      snapshotter,
      next,
    }
  }
}

#[async_trait]
impl Step for SnapshotOutputStep {
  async fn execute(&self, context: Context) -> StepResult {
    let started = Instant::now();
    let mut result = self.next.execute(context).await;

    let files = match &result.outcome {
      Ok(output) if output.outcome == ExecutionOutcome::Executed => output.files.clone(),
      _ => return result,
    };

    match OutputSnapshot::capture(&self.snapshotter, &files) {
      Ok(snapshot) => {
        result.output_snapshot = Some(snapshot);
        result.origin = Some(OriginMetadata {
          build_invocation_id: self.build_invocation_id.clone(),
          execution_time_ms: started.elapsed().as_millis() as u64,
        });
        result
      }
      Err(e) => StepResult::failed(e),
    }
  }
}
