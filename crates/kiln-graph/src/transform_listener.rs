use kiln_transform::{Subject, Transformer};

/// Hooks around every transformer invocation.
pub trait ArtifactTransformListener: Send + Sync {
  fn before_transformer_invocation(&self, transformer: &dyn Transformer, subject: &Subject);

  fn after_transformer_invocation(&self, transformer: &dyn Transformer, subject: &Subject);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransformListener;

impl ArtifactTransformListener for NoopTransformListener {
  fn before_transformer_invocation(&self, _transformer: &dyn Transformer, _subject: &Subject) {}

  fn after_transformer_invocation(&self, _transformer: &dyn Transformer, _subject: &Subject) {}
}
