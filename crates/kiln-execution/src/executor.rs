//! Runs units of work through the composed pipeline.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::context::{Context, ExecutionState, OriginMetadata};
use crate::error::ExecutionError;
use crate::snapshot::OutputSnapshot;
use crate::steps::Step;
use crate::work::{ExecutionOutcome, UnitOfWork, WorkOutput};

/// Result of one execution: its final state plus what the pipeline produced.
#[derive(Debug)]
pub struct ExecutionResult {
  pub state: ExecutionState,
  pub outcome: Result<WorkOutput, ExecutionError>,
  pub output_snapshot: Option<OutputSnapshot>,
  pub origin: Option<OriginMetadata>,
}

impl ExecutionResult {
  pub fn is_success(&self) -> bool {
    self.outcome.is_ok()
  }
}

/// Entry point to the execution pipeline.
#[derive(Clone)]
pub struct WorkExecutor {
  pipeline: Arc<dyn Step>,
}

impl WorkExecutor {
  pub fn new(pipeline: Arc<dyn Step>) -> Self {
    Self { pipeline }
  }

  #[instrument(skip(self, work), fields(work = %work.display_name()))]
  pub async fn execute(&self, work: Arc<dyn UnitOfWork>) -> ExecutionResult {
    let context = Context::new(work);
    let state = context.state.clone();
    let result = self.pipeline.execute(context).await;

    match &result.outcome {
      Ok(output) => {
        // up-to-date work already reached its terminal state
        if output.outcome != ExecutionOutcome::UpToDate {
          state.transition(ExecutionState::Success);
        }
        info!(outcome = ?output.outcome, files = output.files.len(), "work finished");
      }
      Err(e) => {
        state.transition(ExecutionState::Failed);
        warn!(error = %e, "work failed");
      }
    }

    ExecutionResult {
      state: state.get(),
      outcome: result.outcome,
      output_snapshot: result.output_snapshot,
      origin: result.origin,
    }
  }
}
