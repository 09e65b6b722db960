use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_execution::{DirWorkspaceProvider, ExecutionServices, InMemoryBuildCache, InMemoryExecutionHistoryStore};
use kiln_graph::TransformerInvoker;
use kiln_transform::{NoDependencies, builtin_transformer};
use serde_json::json;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
  std::fs::create_dir_all(dir).unwrap();
  let path = dir.join(name);
  std::fs::write(&path, content).unwrap();
  path
}

/// An invoker for a fresh build: its own history, sharing `cache`.
fn build(root: &Path, cache: &Arc<InMemoryBuildCache>) -> TransformerInvoker {
  let services = ExecutionServices::new(Arc::new(InMemoryExecutionHistoryStore::new())).with_build_cache(cache.clone());
  TransformerInvoker::from_services(&services, Arc::new(DirWorkspaceProvider::new(root.join("workspaces"))))
}

#[tokio::test]
async fn test_same_content_under_other_name_is_separate_work() {
  let dir = tempfile::tempdir().unwrap();
  let a = write(dir.path(), "a.jar", "same");
  let b = write(dir.path(), "b.jar", "same");
  let cache = Arc::new(InMemoryBuildCache::new());
  let invoker = build(dir.path(), &cache);
  let checksum = builtin_transformer("checksum", &json!({})).unwrap();

  let a_files = invoker
    .invoke(checksum.clone(), &a, Arc::new(NoDependencies))
    .await
    .unwrap();
  assert!(!invoker.has_cached_result(checksum.as_ref(), &b));

  let b_files = invoker
    .invoke(checksum.clone(), &b, Arc::new(NoDependencies))
    .await
    .unwrap();
  assert!(a_files[0].ends_with("a.jar.blake3"));
  assert!(b_files[0].ends_with("b.jar.blake3"));
  assert_ne!(a_files[0].parent(), b_files[0].parent());
  assert!(a_files[0].exists());
  assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_build_cache_does_not_share_outputs_across_names() {
  let dir = tempfile::tempdir().unwrap();
  let a = write(&dir.path().join("one"), "a.jar", "same");
  let b = write(&dir.path().join("two"), "b.jar", "same");
  let cache = Arc::new(InMemoryBuildCache::new());
  let checksum = builtin_transformer("checksum", &json!({})).unwrap();

  build(&dir.path().join("first"), &cache)
    .invoke(checksum.clone(), &a, Arc::new(NoDependencies))
    .await
    .unwrap();
  let files = build(&dir.path().join("second"), &cache)
    .invoke(checksum.clone(), &b, Arc::new(NoDependencies))
    .await
    .unwrap();

  assert_eq!(files.len(), 1);
  assert!(files[0].ends_with("b.jar.blake3"));
  assert!(files[0].starts_with(dir.path().join("second")));
  assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_build_cache_hit_is_relocated() {
  let dir = tempfile::tempdir().unwrap();
  let first_input = write(&dir.path().join("one"), "lib.jar", "library");
  let second_input = write(&dir.path().join("two"), "lib.jar", "library");
  let cache = Arc::new(InMemoryBuildCache::new());
  let checksum = builtin_transformer("checksum", &json!({})).unwrap();
  let pass_through = builtin_transformer("pass-through", &json!({})).unwrap();

  let first = build(&dir.path().join("first"), &cache);
  first
    .invoke(checksum.clone(), &first_input, Arc::new(NoDependencies))
    .await
    .unwrap();
  first
    .invoke(pass_through.clone(), &first_input, Arc::new(NoDependencies))
    .await
    .unwrap();
  assert_eq!(cache.len(), 2);

  let second = build(&dir.path().join("second"), &cache);
  let checksums = second
    .invoke(checksum.clone(), &second_input, Arc::new(NoDependencies))
    .await
    .unwrap();
  let passed = second
    .invoke(pass_through.clone(), &second_input, Arc::new(NoDependencies))
    .await
    .unwrap();

  // both loaded from cache, resolved against this build's locations
  assert_eq!(cache.len(), 2);
  assert!(checksums[0].starts_with(dir.path().join("second")));
  assert!(checksums[0].ends_with("lib.jar.blake3"));
  assert!(checksums[0].exists());
  assert_eq!(passed, vec![second_input]);
}
