//! Kiln Graph
//!
//! Transformation chains as nodes of a larger execution graph.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               TransformingArtifactListener                  │
//! │  - artifact_available / file_available from resolution      │
//! │  - one TransformationOperation per artifact id or file      │
//! │  - cached result → run now, otherwise → OperationQueue      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │      TransformationNode (Initial | Chained)                 │
//! │  - resolve_dependencies(resolver, visit)                    │
//! │  - execute(runner, listener) → write-once Subject           │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TransformationStep → TransformerInvoker → WorkExecutor     │
//! │  - per-build result map, workspace per input                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations run on a [`BuildOperationRunner`], a semaphore-bounded pool
//! that reports every operation to an [`OperationNotifier`].

mod artifact;
mod error;
mod events;
mod invoker;
mod listener;
mod node;
mod operation;
mod registry;
mod resolver;
mod transform_listener;
mod transformation;

pub use artifact::{ArtifactResolution, FileArtifactSet, ResolvableArtifactSet, ResolvedArtifact};
pub use error::{ArtifactResolveError, GraphError, OperationError, ResolveError};
pub use events::{ChannelNotifier, NoopNotifier, OperationEvent, OperationNotifier};
pub use invoker::{TransformerExecution, TransformerInvoker};
pub use listener::{
  AsyncArtifactListener, ResolveOnlyListener, SharedResults, TransformationOperation,
  TransformingArtifactListener,
};
pub use node::{NodeKind, NodeSequence, TransformationNode};
pub use operation::{
  BuildOperationRunner, OperationCategory, OperationDescriptor, OperationQueue, RunnableOperation,
};
pub use registry::TransformationNodeRegistry;
pub use resolver::{DependencyResolver, NoDependencyResolver, NodeRef};
pub use transform_listener::{ArtifactTransformListener, NoopTransformListener};
pub use transformation::{Transformation, TransformationChain, TransformationStep};
