//! Transformations: single steps and chains of steps over a subject.

use std::sync::Arc;

use async_trait::async_trait;
use kiln_transform::{ArtifactDependencies, NoDependencies, Subject, Transformer};
use tracing::{info, warn};

use crate::invoker::TransformerInvoker;
use crate::transform_listener::ArtifactTransformListener;

/// Something that turns one subject into the next.
#[async_trait]
pub trait Transformation: Send + Sync {
  async fn transform(&self, subject: &Subject, listener: &dyn ArtifactTransformListener) -> Subject;

  /// The subject `transform` would return, if it is already known without
  /// running anything.
  fn cached_result(&self, subject: &Subject) -> Option<Subject>;

  fn has_cached_result(&self, subject: &Subject) -> bool {
    self.cached_result(subject).is_some()
  }

  fn display_name(&self) -> String;
}

/// A single transformer applied to every file of a subject.
pub struct TransformationStep {
  transformer: Arc<dyn Transformer>,
  invoker: Arc<TransformerInvoker>,
  dependencies: Arc<dyn ArtifactDependencies>,
}

impl TransformationStep {
  pub fn new(transformer: Arc<dyn Transformer>, invoker: Arc<TransformerInvoker>) -> Self {
    Self {
      transformer,
      invoker,
      dependencies: Arc::new(NoDependencies),
    }
  }

  pub fn with_dependencies(mut self, dependencies: Arc<dyn ArtifactDependencies>) -> Self {
    self.dependencies = dependencies;
    self
  }

  pub fn transformer(&self) -> &Arc<dyn Transformer> {
    &self.transformer
  }
}

#[async_trait]
impl Transformation for TransformationStep {
  async fn transform(&self, subject: &Subject, listener: &dyn ArtifactTransformListener) -> Subject {
    // A failed subject passes through untouched; nothing is invoked.
    let files = match subject.files() {
      Ok(files) => files,
      Err(_) => return subject.clone(),
    };

    let mut outputs = Vec::new();
    for file in files {
      listener.before_transformer_invocation(self.transformer.as_ref(), subject);
      let result = self
        .invoker
        .invoke(self.transformer.clone(), file, self.dependencies.clone())
        .await;
      listener.after_transformer_invocation(self.transformer.as_ref(), subject);

      match result {
        Ok(files) => outputs.extend(files),
        Err(e) => {
          warn!(
            subject = %subject,
            transformer = %self.transformer.display_name(),
            error = %e,
            "transform failed"
          );
          return subject.transformation_failed(Arc::new(e));
        }
      }
    }

    info!(
      subject = %subject,
      transformer = %self.transformer.display_name(),
      outputs = outputs.len(),
      "transform succeeded"
    );
    subject.transformation_successful(outputs)
  }

  fn cached_result(&self, subject: &Subject) -> Option<Subject> {
    let Ok(files) = subject.files() else {
      return Some(subject.clone());
    };
    let mut outputs = Vec::new();
    for file in files {
      outputs.extend(self.invoker.cached_result(self.transformer.as_ref(), file)?);
    }
    Some(subject.transformation_successful(outputs))
  }

  fn display_name(&self) -> String {
    self.transformer.display_name().to_string()
  }
}

/// Steps applied one after another.
pub struct TransformationChain {
  steps: Vec<Arc<TransformationStep>>,
}

impl TransformationChain {
  pub fn new(steps: Vec<Arc<TransformationStep>>) -> Self {
    Self { steps }
  }

  pub fn steps(&self) -> &[Arc<TransformationStep>] {
    &self.steps
  }
}

#[async_trait]
impl Transformation for TransformationChain {
  async fn transform(&self, subject: &Subject, listener: &dyn ArtifactTransformListener) -> Subject {
    let mut current = subject.clone();
    for step in &self.steps {
      current = step.transform(&current, listener).await;
    }
    current
  }

  fn cached_result(&self, subject: &Subject) -> Option<Subject> {
    self
      .steps
      .iter()
      .try_fold(subject.clone(), |current, step| step.cached_result(&current))
  }

  fn display_name(&self) -> String {
    self
      .steps
      .iter()
      .map(|step| step.display_name())
      .collect::<Vec<_>>()
      .join(" -> ")
  }
}
