//! Values flowing through the pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::CacheKey;
use crate::error::ExecutionError;
use crate::hash::HashCode;
use crate::snapshot::{FileSnapshot, OutputSnapshot};
use crate::work::{UnitOfWork, WorkOutput};

/// Input state captured before deciding whether to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeExecutionState {
  pub implementation: HashCode,
  pub inputs: BTreeMap<String, FileSnapshot>,
}

/// Where a set of outputs was originally produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMetadata {
  pub build_invocation_id: String,
  pub execution_time_ms: u64,
}

/// What the history store remembers about an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterExecutionState {
  pub before: BeforeExecutionState,
  pub outputs: Vec<PathBuf>,
  pub output_snapshot: OutputSnapshot,
  pub successful: bool,
  pub origin: OriginMetadata,
}

/// Lifecycle of a single execution.
///
/// `Pending -> (UpToDate | Executing) -> (Success | Failed)`. A failure
/// before any decision was made (an unreadable input) goes straight from
/// `Pending` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
  Pending,
  UpToDate,
  Executing,
  Success,
  Failed,
}

impl ExecutionState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::UpToDate | Self::Success | Self::Failed)
  }

  fn can_transition_to(&self, next: ExecutionState) -> bool {
    use ExecutionState::*;
    matches!(
      (self, next),
      (Pending, UpToDate) | (Pending, Executing) | (Pending, Failed) | (Executing, Success) | (Executing, Failed)
    )
  }
}

/// Shared state cell for one execution. Refuses to leave a terminal state.
#[derive(Debug)]
pub struct ExecutionStateCell {
  state: Mutex<ExecutionState>,
}

impl ExecutionStateCell {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(ExecutionState::Pending),
    }
  }

  pub fn get(&self) -> ExecutionState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Move to `next`; returns false (and leaves the state alone) if the
  /// transition is not allowed.
  pub fn transition(&self, next: ExecutionState) -> bool {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    if *state == next {
      return true;
    }
    if !state.can_transition_to(next) {
      warn!(from = ?*state, to = ?next, "invalid execution state transition");
      return false;
    }
    *state = next;
    true
  }
}

impl Default for ExecutionStateCell {
  fn default() -> Self {
    Self::new()
  }
}

/// Per-execution context handed from step to step.
#[derive(Clone)]
pub struct Context {
  pub work: Arc<dyn UnitOfWork>,
  pub state: Arc<ExecutionStateCell>,
  pub before_execution: Option<BeforeExecutionState>,
  pub previous_execution: Option<AfterExecutionState>,
  pub cache_key: Option<CacheKey>,
}

impl Context {
  pub fn new(work: Arc<dyn UnitOfWork>) -> Self {
    Self {
      work,
      state: Arc::new(ExecutionStateCell::new()),
      before_execution: None,
      previous_execution: None,
      cache_key: None,
    }
  }
}

/// What each step hands back to the one wrapping it.
#[derive(Debug)]
pub struct StepResult {
  pub outcome: Result<WorkOutput, ExecutionError>,
  pub output_snapshot: Option<OutputSnapshot>,
  pub origin: Option<OriginMetadata>,
}

impl StepResult {
  pub fn success(output: WorkOutput) -> Self {
    Self {
      outcome: Ok(output),
      output_snapshot: None,
      origin: None,
    }
  }

  pub fn failed(error: ExecutionError) -> Self {
    Self {
      outcome: Err(error),
      output_snapshot: None,
      origin: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_machine() {
    let cell = ExecutionStateCell::new();
    assert_eq!(cell.get(), ExecutionState::Pending);
    assert!(cell.transition(ExecutionState::Executing));
    assert!(!cell.transition(ExecutionState::UpToDate));
    assert!(cell.transition(ExecutionState::Success));
    assert!(cell.get().is_terminal());

    // terminal states are never left
    assert!(!cell.transition(ExecutionState::Failed));
    assert!(!cell.transition(ExecutionState::Executing));
    assert_eq!(cell.get(), ExecutionState::Success);
  }

  #[test]
  fn test_up_to_date_is_terminal() {
    let cell = ExecutionStateCell::new();
    assert!(cell.transition(ExecutionState::UpToDate));
    assert!(!cell.transition(ExecutionState::Executing));
    assert_eq!(cell.get(), ExecutionState::UpToDate);
  }
}
