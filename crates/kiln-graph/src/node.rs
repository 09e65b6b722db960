//! Transformation nodes of the execution graph.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use kiln_transform::{Failure, ScopeContext, Subject};
use tracing::{debug, instrument};

use crate::artifact::ResolvableArtifactSet;
use crate::error::{ArtifactResolveError, GraphError, ResolveError};
use crate::operation::{BuildOperationRunner, OperationDescriptor, RunnableOperation};
use crate::resolver::{DependencyResolver, NodeRef};
use crate::transform_listener::ArtifactTransformListener;
use crate::transformation::{Transformation, TransformationStep};

/// Hands out node creation order. Owned by whoever builds the graph.
#[derive(Debug, Default)]
pub struct NodeSequence {
  next: AtomicU64,
}

impl NodeSequence {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn next(&self) -> u64 {
    self.next.fetch_add(1, AtomicOrdering::Relaxed)
  }
}

/// What a node transforms.
pub enum NodeKind {
  /// Resolves a base artifact and transforms it.
  Initial {
    artifact_set: Arc<dyn ResolvableArtifactSet>,
    scope: ScopeContext,
  },
  /// Transforms the result of the previous node.
  Chained { previous: Arc<TransformationNode> },
}

impl NodeKind {
  fn name(&self) -> &'static str {
    match self {
      Self::Initial { .. } => "initial",
      Self::Chained { .. } => "chained",
    }
  }
}

/// One transformation step in the execution graph.
///
/// Executed exactly once by the scheduler after its dependencies. Failures
/// are carried in the transformed subject; the node never fails itself and
/// contributes no tasks.
pub struct TransformationNode {
  order: u64,
  step: Arc<TransformationStep>,
  kind: NodeKind,
  transformed: OnceLock<Subject>,
  dependencies: Mutex<Vec<NodeRef>>,
}

impl TransformationNode {
  pub fn initial(
    sequence: &NodeSequence,
    step: Arc<TransformationStep>,
    artifact_set: Arc<dyn ResolvableArtifactSet>,
    scope: ScopeContext,
  ) -> Arc<Self> {
    Self::create(sequence, step, NodeKind::Initial { artifact_set, scope })
  }

  pub fn chained(
    sequence: &NodeSequence,
    step: Arc<TransformationStep>,
    previous: Arc<TransformationNode>,
  ) -> Arc<Self> {
    Self::create(sequence, step, NodeKind::Chained { previous })
  }

  fn create(sequence: &NodeSequence, step: Arc<TransformationStep>, kind: NodeKind) -> Arc<Self> {
    Arc::new(Self {
      order: sequence.next(),
      step,
      kind,
      transformed: OnceLock::new(),
      dependencies: Mutex::new(Vec::new()),
    })
  }

  pub fn order(&self) -> u64 {
    self.order
  }

  pub fn step(&self) -> &Arc<TransformationStep> {
    &self.step
  }

  pub fn kind(&self) -> &NodeKind {
    &self.kind
  }

  pub fn display_name(&self) -> String {
    self.step.display_name()
  }

  /// Register this node's hard dependencies, passing each to `visit`.
  pub fn resolve_dependencies(&self, resolver: &dyn DependencyResolver, visit: &mut dyn FnMut(&NodeRef)) {
    let found = match &self.kind {
      NodeKind::Initial { artifact_set, .. } => resolver.resolve_dependencies_for(None, artifact_set.as_ref()),
      NodeKind::Chained { previous } => vec![NodeRef::Transform(previous.clone())],
    };

    let mut dependencies = self.dependencies.lock().unwrap_or_else(|e| e.into_inner());
    for dependency in found {
      visit(&dependency);
      if !dependencies.contains(&dependency) {
        dependencies.push(dependency);
      }
    }
  }

  pub fn dependencies(&self) -> Vec<NodeRef> {
    self.dependencies.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Tasks contributed to the task graph. Always none.
  pub fn tasks(&self) -> Vec<String> {
    Vec::new()
  }

  /// Failures live in the transformed subject, never on the node.
  pub fn node_failure(&self) -> Option<Failure> {
    None
  }

  /// Run the transformation. Call once, after every dependency completed.
  #[instrument(skip_all, fields(node = %self.display_name(), order = self.order, kind = self.kind.name()))]
  pub async fn execute(
    &self,
    runner: &BuildOperationRunner,
    listener: Arc<dyn ArtifactTransformListener>,
  ) -> Result<(), GraphError> {
    if self.transformed.get().is_some() {
      return Err(GraphError::AlreadyExecuted {
        node: self.display_name(),
      });
    }

    let subject = match &self.kind {
      NodeKind::Initial { artifact_set, scope } => {
        let operation = InitialTransformOperation {
          step: self.step.clone(),
          artifact_set: artifact_set.clone(),
          scope: scope.clone(),
          listener,
          result: Mutex::new(None),
        };
        runner.run(&operation).await?;
        operation.take()?
      }
      NodeKind::Chained { previous } => {
        let operation = ChainedTransformOperation {
          step: self.step.clone(),
          input: previous.transformed_subject()?.clone(),
          listener,
          result: Mutex::new(None),
        };
        runner.run(&operation).await?;
        operation.take()?
      }
    };

    debug!(subject = %subject, failed = subject.is_failed(), "node executed");
    self
      .transformed
      .set(subject)
      .map_err(|_| GraphError::AlreadyExecuted {
        node: self.display_name(),
      })
  }

  /// The subject produced by [`execute`](Self::execute).
  pub fn transformed_subject(&self) -> Result<&Subject, GraphError> {
    self.transformed.get().ok_or_else(|| GraphError::NotExecuted {
      node: self.display_name(),
    })
  }

  pub fn is_executed(&self) -> bool {
    self.transformed.get().is_some()
  }
}

impl fmt::Display for TransformationNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.display_name())
  }
}

impl PartialEq for TransformationNode {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for TransformationNode {}

impl PartialOrd for TransformationNode {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Same kind: oldest first. Different kinds: by kind name.
impl Ord for TransformationNode {
  fn cmp(&self, other: &Self) -> Ordering {
    let (mine, theirs) = (self.kind.name(), other.kind.name());
    if mine != theirs {
      return mine.cmp(theirs);
    }
    self.order.cmp(&other.order)
  }
}

type OperationResult = Mutex<Option<Result<Subject, GraphError>>>;

fn take_result(result: &OperationResult, step: &TransformationStep) -> Result<Subject, GraphError> {
  let mut result = result.lock().unwrap_or_else(|e| e.into_inner());
  result.take().unwrap_or_else(|| {
    Err(GraphError::NotExecuted {
      node: step.display_name(),
    })
  })
}

fn set_result(result: &OperationResult, value: Result<Subject, GraphError>) {
  *result.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
}

struct InitialTransformOperation {
  step: Arc<TransformationStep>,
  artifact_set: Arc<dyn ResolvableArtifactSet>,
  scope: ScopeContext,
  listener: Arc<dyn ArtifactTransformListener>,
  result: OperationResult,
}

impl InitialTransformOperation {
  fn subject_name(&self) -> String {
    format!("artifact {}", self.artifact_set.artifact_id())
  }

  fn take(&self) -> Result<Subject, GraphError> {
    take_result(&self.result, &self.step)
  }

  async fn transform(&self) -> Result<Subject, GraphError> {
    let resolution = self.artifact_set.resolve().await;

    if !resolution.failures.is_empty() {
      let mut failures = resolution.failures;
      let failure: Failure = if failures.len() == 1 && failures[0].downcast_ref::<ResolveError>().is_some() {
        failures.remove(0)
      } else {
        Arc::new(ArtifactResolveError::new(self.step.display_name(), failures))
      };
      return Ok(Subject::failed(self.subject_name(), failure));
    }

    let mut artifacts = resolution.artifacts;
    if artifacts.len() != 1 {
      return Err(GraphError::UnexpectedArtifactCount {
        artifact: self.artifact_set.artifact_id().clone(),
        count: artifacts.len(),
      });
    }
    let artifact = artifacts.remove(0);
    let initial = Subject::initial_artifact(artifact.id, artifact.file, self.scope.clone());
    Ok(self.step.transform(&initial, self.listener.as_ref()).await)
  }
}

#[async_trait]
impl RunnableOperation for InitialTransformOperation {
  fn description(&self) -> OperationDescriptor {
    OperationDescriptor::transform(&self.subject_name(), &self.step.display_name())
  }

  async fn run(&self) {
    set_result(&self.result, self.transform().await);
  }
}

struct ChainedTransformOperation {
  step: Arc<TransformationStep>,
  input: Subject,
  listener: Arc<dyn ArtifactTransformListener>,
  result: OperationResult,
}

impl ChainedTransformOperation {
  fn take(&self) -> Result<Subject, GraphError> {
    take_result(&self.result, &self.step)
  }
}

#[async_trait]
impl RunnableOperation for ChainedTransformOperation {
  fn description(&self) -> OperationDescriptor {
    OperationDescriptor::transform(&self.input.display_name(), &self.step.display_name())
  }

  async fn run(&self) {
    let subject = self.step.transform(&self.input, self.listener.as_ref()).await;
    set_result(&self.result, Ok(subject));
  }
}
