use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Step;
use crate::context::{Context, StepResult};
use crate::outputs::{OutputChangeListener, OutputLocks};
use crate::work::{ExecutionOutcome, WorkOutput};

/// Runs the raw work on the blocking pool.
///
/// The work holds its output directory lock until it returns, so a retry
/// after a timeout or cancellation never writes alongside the abandoned run.
pub struct ExecuteStep {
  output_change_listener: Arc<dyn OutputChangeListener>,
  output_locks: Arc<OutputLocks>,
}

impl ExecuteStep {
  pub fn new(output_change_listener: Arc<dyn OutputChangeListener>, output_locks: Arc<OutputLocks>) -> Self {
    Self {
      output_change_listener,
      output_locks,
    }
  }
}

#[async_trait]
impl Step for ExecuteStep {
  async fn execute(&self, context: Context) -> StepResult {
    let work = context.work.clone();
    let listener = self.output_change_listener.clone();
    let lock = self.output_locks.lock_for(work.output_directory());

    debug!(work = %work.display_name(), "invoking work");
    let handle = tokio::task::spawn_blocking(move || {
      let _guard = lock.acquire();
      listener.before_output_change(&[work.output_directory().to_path_buf()]);
      work.execute()
    });
    match handle.await {
      Ok(Ok(files)) => StepResult::success(WorkOutput {
        outcome: ExecutionOutcome::Executed,
        files,
      }),
      Ok(Err(e)) => StepResult::failed(e),
      // Hand the panic to the catch step above.
      Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
      Err(_) => StepResult::failed(crate::error::ExecutionError::Cancelled {
        work: context.work.display_name(),
      }),
    }
  }
}
