use std::sync::Arc;

use async_trait::async_trait;

use super::Step;
use crate::cache::CacheKey;
use crate::context::{Context, StepResult};

/// Computes the build cache key for cacheable work.
pub struct PrepareCachingStep {
  next: Arc<dyn Step>,
}

impl PrepareCachingStep {
  pub fn new(next: Arc<dyn Step>) -> Self {
    Self { next }
  }
}

#[async_trait]
impl Step for PrepareCachingStep {
  async fn execute(&self, mut context: Context) -> StepResult {
    if context.work.is_cacheable() {
      context.cache_key = context.before_execution.as_ref().map(CacheKey::for_inputs);
    }
    self.next.execute(context).await
  }
}
