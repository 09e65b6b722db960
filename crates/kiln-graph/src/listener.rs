//! Bridges artifact discovery callbacks to transformation operations.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kiln_transform::{ArtifactId, ScopeContext, Subject};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::artifact::ResolvedArtifact;
use crate::operation::{OperationDescriptor, OperationQueue, RunnableOperation};
use crate::transform_listener::ArtifactTransformListener;
use crate::transformation::Transformation;

/// Receives artifacts and loose files as resolution discovers them.
#[async_trait]
pub trait AsyncArtifactListener: Send + Sync {
  async fn artifact_available(&self, artifact: &ResolvedArtifact);

  async fn file_available(&self, file: &Path);

  /// Whether artifact files must exist on disk before being reported.
  fn require_artifact_files(&self) -> bool;

  /// Whether loose file dependencies are reported as well.
  fn include_file_dependencies(&self) -> bool;
}

/// Listener that only needs artifacts resolved, not processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOnlyListener;

#[async_trait]
impl AsyncArtifactListener for ResolveOnlyListener {
  async fn artifact_available(&self, _artifact: &ResolvedArtifact) {}

  async fn file_available(&self, _file: &Path) {}

  fn require_artifact_files(&self) -> bool {
    true
  }

  fn include_file_dependencies(&self) -> bool {
    false
  }
}

/// A transformation applied to one initial subject, run at most once.
pub struct TransformationOperation {
  transformation: Arc<dyn Transformation>,
  subject: Subject,
  listener: Arc<dyn ArtifactTransformListener>,
  result: OnceCell<Subject>,
}

impl TransformationOperation {
  pub fn new(
    transformation: Arc<dyn Transformation>,
    subject: Subject,
    listener: Arc<dyn ArtifactTransformListener>,
  ) -> Self {
    Self {
      transformation,
      subject,
      listener,
      result: OnceCell::new(),
    }
  }

  pub fn subject(&self) -> &Subject {
    &self.subject
  }

  /// The transformed subject, once the operation ran.
  pub fn result(&self) -> Option<&Subject> {
    self.result.get()
  }

  /// Run the transformation if nobody has yet, and return its result.
  pub async fn transformed_subject(&self) -> &Subject {
    self
      .result
      .get_or_init(|| self.transformation.transform(&self.subject, self.listener.as_ref()))
      .await
  }
}

#[async_trait]
impl RunnableOperation for TransformationOperation {
  fn description(&self) -> OperationDescriptor {
    OperationDescriptor::transform(&self.subject.display_name(), &self.transformation.display_name())
  }

  async fn run(&self) {
    self.transformed_subject().await;
  }
}

/// Identity-keyed operations shared between listeners of one build.
pub type SharedResults<K> = Arc<Mutex<HashMap<K, Arc<TransformationOperation>>>>;

/// Turns discovered artifacts and files into transformation operations.
///
/// Operations are deduplicated by artifact id and by file path, in two
/// separate maps. A subject whose result is already known is transformed
/// immediately; anything else is queued for the operation runner.
pub struct TransformingArtifactListener {
  transformation: Arc<dyn Transformation>,
  delegate: Arc<dyn AsyncArtifactListener>,
  queue: Arc<OperationQueue>,
  artifact_results: SharedResults<ArtifactId>,
  file_results: SharedResults<PathBuf>,
  scope: ScopeContext,
  transform_listener: Arc<dyn ArtifactTransformListener>,
}

impl TransformingArtifactListener {
  pub fn new(
    transformation: Arc<dyn Transformation>,
    delegate: Arc<dyn AsyncArtifactListener>,
    queue: Arc<OperationQueue>,
    artifact_results: SharedResults<ArtifactId>,
    file_results: SharedResults<PathBuf>,
    scope: ScopeContext,
    transform_listener: Arc<dyn ArtifactTransformListener>,
  ) -> Self {
    Self {
      transformation,
      delegate,
      queue,
      artifact_results,
      file_results,
      scope,
      transform_listener,
    }
  }

  pub fn artifact_results(&self) -> &SharedResults<ArtifactId> {
    &self.artifact_results
  }

  pub fn file_results(&self) -> &SharedResults<PathBuf> {
    &self.file_results
  }

  async fn initial_subject_available<K: Eq + Hash + Send>(&self, key: K, subject: Subject, results: &SharedResults<K>) {
    let operation = {
      let mut results = results.lock().unwrap_or_else(|e| e.into_inner());
      match results.entry(key) {
        Entry::Occupied(_) => {
          debug!(subject = %subject, "transformation already scheduled");
          return;
        }
        Entry::Vacant(entry) => {
          let operation = Arc::new(TransformationOperation::new(
            self.transformation.clone(),
            subject,
            self.transform_listener.clone(),
          ));
          entry.insert(operation.clone());
          operation
        }
      }
    };

    if self.transformation.has_cached_result(operation.subject()) {
      debug!(subject = %operation.subject(), "transformation result cached, running immediately");
      operation.run().await;
    } else {
      self.queue.add(operation);
    }
  }
}

#[async_trait]
impl AsyncArtifactListener for TransformingArtifactListener {
  async fn artifact_available(&self, artifact: &ResolvedArtifact) {
    let subject = Subject::initial_artifact(artifact.id.clone(), artifact.file.clone(), self.scope.clone());
    self
      .initial_subject_available(artifact.id.clone(), subject, &self.artifact_results)
      .await;
  }

  async fn file_available(&self, file: &Path) {
    let subject = Subject::initial_file(file, self.scope.clone());
    self
      .initial_subject_available(file.to_path_buf(), subject, &self.file_results)
      .await;
  }

  /// Transforms need the file content on disk.
  fn require_artifact_files(&self) -> bool {
    true
  }

  fn include_file_dependencies(&self) -> bool {
    self.delegate.include_file_dependencies()
  }
}
