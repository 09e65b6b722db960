//! Pipeline steps.
//!
//! Each step wraps the next one and may short-circuit it. The full pipeline
//! is composed once by [`ExecutionServices`](crate::ExecutionServices),
//! innermost-out:
//!
//! | Order | Step |
//! |---|---|
//! | 1 (outermost) | [`SkipUpToDateStep`] |
//! | 2 | [`StoreSnapshotsStep`] |
//! | 3 | [`PrepareCachingStep`] |
//! | 4 | [`CacheStep`] |
//! | 5 | [`SnapshotOutputStep`] |
//! | 6 | [`CreateOutputsStep`] |
//! | 7 | [`CatchExceptionStep`] |
//! | 8 | [`TimeoutStep`] |
//! | 9 | [`CancelExecutionStep`] |
//! | 10 (innermost) | [`ExecuteStep`] |

mod cache;
mod cancel;
mod catch;
mod create_outputs;
mod execute;
mod prepare_caching;
mod skip_up_to_date;
mod snapshot_output;
mod store_snapshots;
mod timeout;

use async_trait::async_trait;

use crate::context::{Context, StepResult};

pub use cache::CacheStep;
pub use cancel::CancelExecutionStep;
pub use catch::CatchExceptionStep;
pub use create_outputs::CreateOutputsStep;
pub use execute::ExecuteStep;
pub use prepare_caching::PrepareCachingStep;
pub use skip_up_to_date::SkipUpToDateStep;
pub use snapshot_output::SnapshotOutputStep;
pub use store_snapshots::StoreSnapshotsStep;
pub use timeout::TimeoutStep;

/// One stage of the execution pipeline.
#[async_trait]
pub trait Step: Send + Sync {
  async fn execute(&self, context: Context) -> StepResult;
}
