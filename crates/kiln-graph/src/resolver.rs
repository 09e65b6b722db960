//! Dependency resolution contract between nodes and the surrounding graph.

use std::fmt;
use std::sync::Arc;

use crate::artifact::ResolvableArtifactSet;
use crate::node::TransformationNode;

/// A node of the surrounding execution graph.
#[derive(Clone)]
pub enum NodeRef {
  Transform(Arc<TransformationNode>),
  /// Any other node (a task producing an artifact), named for display.
  External(String),
}

impl NodeRef {
  pub fn display_name(&self) -> String {
    match self {
      Self::Transform(node) => node.display_name(),
      Self::External(name) => name.clone(),
    }
  }
}

impl fmt::Debug for NodeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Transform(node) => write!(f, "Transform({}#{})", node.display_name(), node.order()),
      Self::External(name) => write!(f, "External({name})"),
    }
  }
}

impl PartialEq for NodeRef {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Transform(a), Self::Transform(b)) => Arc::ptr_eq(a, b),
      (Self::External(a), Self::External(b)) => a == b,
      _ => false,
    }
  }
}

/// Finds the nodes that must run before an artifact set can be resolved.
pub trait DependencyResolver: Send + Sync {
  fn resolve_dependencies_for(
    &self,
    owner: Option<&str>,
    artifact_set: &dyn ResolvableArtifactSet,
  ) -> Vec<NodeRef>;
}

/// Resolver for artifact sets that need nothing built first.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencyResolver;

impl DependencyResolver for NoDependencyResolver {
  fn resolve_dependencies_for(
    &self,
    _owner: Option<&str>,
    _artifact_set: &dyn ResolvableArtifactSet,
  ) -> Vec<NodeRef> {
    Vec::new()
  }
}
