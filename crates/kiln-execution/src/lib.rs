//! Kiln Execution
//!
//! The incremental execution pipeline. A [`UnitOfWork`] is handed to a
//! [`WorkExecutor`], which decides whether the work must run at all, runs it
//! at most once, and records enough state to skip it next time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ExecutionServices                       │
//! │  - history store, build cache, output files repository      │
//! │  - snapshotter, output change listeners, cancellation       │
//! │  - create_work_executor() composes the steps once           │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkExecutor                          │
//! │  - execute(work) → ExecutionResult                          │
//! │  - Pending → (UpToDate | Executing) → (Success | Failed)    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Steps                               │
//! │  skip up-to-date → store snapshots → prepare caching →      │
//! │  cache → snapshot outputs → create outputs → catch panics → │
//! │  timeout → cancellation → execute (spawn_blocking)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod cache;
mod context;
mod error;
mod executor;
mod hash;
mod history;
mod outputs;
mod services;
mod snapshot;
mod work;
mod workspace;

pub mod steps;

pub use cache::{BuildCache, CacheEntry, CacheKey, CachedPath, InMemoryBuildCache, LocalBuildCache};
pub use context::{
  AfterExecutionState, BeforeExecutionState, Context, ExecutionState, ExecutionStateCell,
  OriginMetadata, StepResult,
};
pub use error::{BoxError, CacheError, ExecutionError, HistoryError};
pub use executor::{ExecutionResult, WorkExecutor};
pub use hash::{HashCode, Hasher};
pub use history::{ExecutionHistoryStore, FsExecutionHistoryStore, InMemoryExecutionHistoryStore};
pub use outputs::{
  CompositeOutputChangeListener, InMemoryOutputFilesRepository, OutputChangeListener,
  OutputFilesRepository, OutputLock, OutputLocks,
};
pub use services::ExecutionServices;
pub use snapshot::{FileSnapshot, FileSystemSnapshotter, OutputSnapshot};
pub use work::{ExecutionOutcome, UnitOfWork, WorkOutput};
pub use workspace::{DirWorkspaceProvider, WorkspaceProvider};
