//! Deduplicated creation of transformation nodes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kiln_execution::{HashCode, Hasher};
use kiln_transform::{ArtifactId, ScopeContext};

use crate::artifact::ResolvableArtifactSet;
use crate::node::{NodeSequence, TransformationNode};
use crate::transformation::TransformationStep;

/// Creates the node sequence for an artifact and a chain of steps, reusing
/// nodes already created for the same artifact and step prefix.
pub struct TransformationNodeRegistry {
  sequence: Arc<NodeSequence>,
  nodes: Mutex<HashMap<(ArtifactId, HashCode), Arc<TransformationNode>>>,
}

impl TransformationNodeRegistry {
  pub fn new(sequence: Arc<NodeSequence>) -> Self {
    Self {
      sequence,
      nodes: Mutex::new(HashMap::new()),
    }
  }

  /// Nodes for every step of the chain, first to last. The last node holds
  /// the chain's result.
  pub fn get_or_create(
    &self,
    artifact_set: Arc<dyn ResolvableArtifactSet>,
    scope: &ScopeContext,
    steps: &[Arc<TransformationStep>],
  ) -> Vec<Arc<TransformationNode>> {
    let artifact_id = artifact_set.artifact_id().clone();
    let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());

    let mut chain_key = Hasher::new();
    chain_key.put_str(scope.name());
    let mut created: Vec<Arc<TransformationNode>> = Vec::with_capacity(steps.len());
    for step in steps {
      chain_key.put_hash(&step.transformer().identity_hash());
      let key = (artifact_id.clone(), chain_key.finish());

      let node = match (nodes.get(&key), created.last()) {
        (Some(existing), _) => existing.clone(),
        (None, None) => TransformationNode::initial(
          &self.sequence,
          step.clone(),
          artifact_set.clone(),
          scope.clone(),
        ),
        (None, Some(previous)) => TransformationNode::chained(&self.sequence, step.clone(), previous.clone()),
      };
      nodes.insert(key, node.clone());
      created.push(node);
    }
    created
  }

  pub fn len(&self) -> usize {
    self.nodes.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
