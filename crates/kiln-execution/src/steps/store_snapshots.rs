use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::Step;
use crate::context::{AfterExecutionState, Context, OriginMetadata, StepResult};
use crate::history::ExecutionHistoryStore;
use crate::outputs::OutputFilesRepository;
use crate::snapshot::OutputSnapshot;

/// Records the execution in history and its outputs in the output files
/// repository.
///
/// Failed runs are recorded as unsuccessful so they are never up to date.
/// Cancelled runs are not recorded at all.
pub struct StoreSnapshotsStep {
  build_invocation_id: String,
  history: Arc<dyn ExecutionHistoryStore>,
  output_files: Arc<dyn OutputFilesRepository>,
  next: Arc<dyn Step>,
}

impl StoreSnapshotsStep {
  pub fn new(
    build_invocation_id: impl Into<String>,
    history: Arc<dyn ExecutionHistoryStore>,
    output_files: Arc<dyn OutputFilesRepository>,
    next: Arc<dyn Step>,
  ) -> Self {
    Self {
      build_invocation_id: build_invocation_id.into(),
      history,
      output_files,
      next,
    }
  }
}

#[async_trait]
impl Step for StoreSnapshotsStep {
  async fn execute(&self, context: Context) -> StepResult {
    let identity = context.work.identity().to_string();
    let before = context.before_execution.clone();
    let result = self.next.execute(context).await;

    let Some(before) = before else {
      return result;
    };

    let state = match &result.outcome {
      Ok(output) => {
        self.output_files.record_output_files(&output.files);
        AfterExecutionState {
          before,
          outputs: output.files.clone(),
          output_snapshot: result.output_snapshot.clone().unwrap_or_default(),
          successful: true,
          origin: result.origin.clone().unwrap_or_else(|| OriginMetadata {
            build_invocation_id: self.build_invocation_id.clone(),
            execution_time_ms: 0,
          }),
        }
      }
      Err(e) if e.is_cancellation() => return result,
      Err(_) => AfterExecutionState {
        before,
        outputs: Vec::new(),
        output_snapshot: OutputSnapshot::default(),
        successful: false,
        origin: OriginMetadata {
          build_invocation_id: self.build_invocation_id.clone(),
          execution_time_ms: 0,
        },
      },
    };

    if let Err(e) = self.history.store(&identity, state).await {
      warn!(identity = %identity, error = %e, "failed to record execution history");
    }
    result
  }
}
