use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Step;
use crate::context::{AfterExecutionState, BeforeExecutionState, Context, ExecutionState, StepResult};
use crate::history::ExecutionHistoryStore;
use crate::snapshot::{FileSnapshot, FileSystemSnapshotter};
use crate::work::{ExecutionOutcome, WorkOutput};

/// Skips work whose inputs and outputs match the last successful execution.
pub struct SkipUpToDateStep {
  history: Arc<dyn ExecutionHistoryStore>,
  snapshotter: Arc<FileSystemSnapshotter>,
  next: Arc<dyn Step>,
}

impl SkipUpToDateStep {
  pub fn new(
    history: Arc<dyn ExecutionHistoryStore>,
    snapshotter: Arc<FileSystemSnapshotter>,
    next: Arc<dyn Step>,
  ) -> Self {
    Self {
      history,
      snapshotter,
      next,
    }
  }

  fn out_of_date_reasons(
    &self,
    before: &BeforeExecutionState,
    previous: Option<&AfterExecutionState>,
  ) -> Vec<String> {
    let Some(previous) = previous else {
      return vec!["no history is available".to_string()];
    };

    let mut reasons = Vec::new();
    if !previous.successful {
      reasons.push("previous execution failed".to_string());
    }
    if previous.before.implementation != before.implementation {
      reasons.push("implementation has changed".to_string());
    }
    input_changes(&previous.before.inputs, &before.inputs, &mut reasons);

    for (path, recorded) in &previous.output_snapshot.files {
      match self.snapshotter.snapshot(path) {
        Ok(current) if current == *recorded => {}
        _ => reasons.push(format!("output {} has been modified", path.display())),
      }
    }
    reasons
  }
}

fn input_changes(
  previous: &BTreeMap<String, FileSnapshot>,
  current: &BTreeMap<String, FileSnapshot>,
  reasons: &mut Vec<String>,
) {
  for (name, snapshot) in current {
    match previous.get(name) {
      None => reasons.push(format!("input {name} has been added")),
      Some(recorded) if recorded != snapshot => reasons.push(format!("input {name} has changed")),
      Some(_) => {}
    }
  }
  for name in previous.keys() {
    if !current.contains_key(name) {
      reasons.push(format!("input {name} has been removed"));
    }
  }
}

#[async_trait]
impl Step for SkipUpToDateStep {
  async fn execute(&self, mut context: Context) -> StepResult {
    let work = context.work.clone();

    let inputs = match work.snapshot_inputs(&self.snapshotter) {
      Ok(inputs) => inputs,
      Err(e) => {
        context.state.transition(ExecutionState::Failed);
        return StepResult::failed(e);
      }
    };
    let before = BeforeExecutionState {
      implementation: work.implementation_hash(),
      inputs,
    };

    let previous = match self.history.load(work.identity()).await {
      Ok(previous) => previous,
      Err(e) => {
        warn!(work = %work.display_name(), error = %e, "failed to load execution history");
        None
      }
    };

    let reasons = self.out_of_date_reasons(&before, previous.as_ref());
    if let (true, Some(previous)) = (reasons.is_empty(), &previous) {
      info!(work = %work.display_name(), "work up to date");
      context.state.transition(ExecutionState::UpToDate);
      return StepResult {
        outcome: Ok(WorkOutput {
          outcome: ExecutionOutcome::UpToDate,
          files: previous.outputs.clone(),
        }),
        output_snapshot: Some(previous.output_snapshot.clone()),
        origin: Some(previous.origin.clone()),
      };
    }

    for reason in &reasons {
      debug!(work = %work.display_name(), reason = %reason, "work out of date");
    }
    context.state.transition(ExecutionState::Executing);
    context.before_execution = Some(before);
    context.previous_execution = previous;
    self.next.execute(context).await
  }
}
