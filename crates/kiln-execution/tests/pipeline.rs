use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kiln_execution::{
  ExecutionError, ExecutionHistoryStore, ExecutionOutcome, ExecutionServices, ExecutionState,
  FileSnapshot, FileSystemSnapshotter, FsExecutionHistoryStore, HashCode, InMemoryBuildCache,
  InMemoryExecutionHistoryStore, InMemoryOutputFilesRepository, OutputChangeListener,
  OutputFilesRepository, UnitOfWork,
};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy)]
enum Behavior {
  Upper,
  Lower,
  Fail,
  Panic,
  Sleep(Duration),
}

/// Writes an upper-cased (or lower-cased) copy of its input into its output directory.
struct UpperWork {
  identity: String,
  implementation: String,
  input: PathBuf,
  output_dir: PathBuf,
  behavior: Behavior,
  timeout: Option<Duration>,
  invocations: Arc<AtomicUsize>,
}

impl UpperWork {
  fn new(input: &Path, output_dir: &Path, invocations: &Arc<AtomicUsize>) -> Self {
    Self {
      identity: "upper:input.txt".to_string(),
      implementation: "upper-v1".to_string(),
      input: input.to_path_buf(),
      output_dir: output_dir.to_path_buf(),
      behavior: Behavior::Upper,
      timeout: None,
      invocations: invocations.clone(),
    }
  }

  fn with_behavior(mut self, behavior: Behavior) -> Self {
    self.behavior = behavior;
    self
  }
}

impl UnitOfWork for UpperWork {
  fn identity(&self) -> &str {
    &self.identity
  }

  fn display_name(&self) -> String {
    format!("upper {}", self.input.display())
  }

  fn implementation_hash(&self) -> HashCode {
    HashCode::of_str(&self.implementation)
  }

  fn snapshot_inputs(
    &self,
    snapshotter: &FileSystemSnapshotter,
  ) -> Result<BTreeMap<String, FileSnapshot>, ExecutionError> {
    let mut inputs = BTreeMap::new();
    inputs.insert(
      "input".to_string(),
      snapshotter.snapshot_for_execution(&self.input)?,
    );
    Ok(inputs)
  }

  fn output_directory(&self) -> &Path {
    &self.output_dir
  }

  fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  fn execute(&self) -> Result<Vec<PathBuf>, ExecutionError> {
    self.invocations.fetch_add(1, Ordering::SeqCst);
    match self.behavior {
      Behavior::Fail => {
        return Err(ExecutionError::Invocation {
          work: self.display_name(),
          source: "boom".into(),
        });
      }
      Behavior::Panic => panic!("transform exploded"),
      Behavior::Sleep(duration) => std::thread::sleep(duration),
      Behavior::Upper | Behavior::Lower => {}
    }

    let content = std::fs::read_to_string(&self.input).map_err(|e| ExecutionError::Invocation {
      work: self.display_name(),
      source: Box::new(e),
    })?;
    let output = self.output_dir.join("output.txt");
    let content = match self.behavior {
      Behavior::Lower => content.to_lowercase(),
      _ => content.to_uppercase(),
    };
    std::fs::write(&output, content).map_err(|e| ExecutionError::Invocation {
      work: self.display_name(),
      source: Box::new(e),
    })?;
    Ok(vec![output])
  }
}

struct Fixture {
  _dir: tempfile::TempDir,
  input: PathBuf,
  output_dir: PathBuf,
  history: Arc<dyn ExecutionHistoryStore>,
  invocations: Arc<AtomicUsize>,
}

impl Fixture {
  fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    std::fs::write(&input, "hello").unwrap();
    let output_dir = dir.path().join("workspace");
    Self {
      history: Arc::new(FsExecutionHistoryStore::new(dir.path().join("history"))),
      input,
      output_dir,
      invocations: Arc::new(AtomicUsize::new(0)),
      _dir: dir,
    }
  }

  fn work(&self) -> UpperWork {
    UpperWork::new(&self.input, &self.output_dir, &self.invocations)
  }

  /// Each build gets fresh services, like a new build invocation.
  fn services(&self) -> ExecutionServices {
    ExecutionServices::new(self.history.clone())
  }

  fn invocations(&self) -> usize {
    self.invocations.load(Ordering::SeqCst)
  }
}

#[tokio::test]
async fn test_second_run_is_up_to_date() {
  let fixture = Fixture::new();

  let first = fixture
    .services()
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(first.state, ExecutionState::Success);
  let output = first.outcome.unwrap();
  assert_eq!(output.outcome, ExecutionOutcome::Executed);
  assert_eq!(output.files, vec![fixture.output_dir.join("output.txt")]);
  assert_eq!(
    std::fs::read_to_string(fixture.output_dir.join("output.txt")).unwrap(),
    "HELLO"
  );
  assert!(first.output_snapshot.is_some());

  let second = fixture
    .services()
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(second.state, ExecutionState::UpToDate);
  let output = second.outcome.unwrap();
  assert_eq!(output.outcome, ExecutionOutcome::UpToDate);
  assert_eq!(output.files, vec![fixture.output_dir.join("output.txt")]);
  assert_eq!(
    second.origin.unwrap().build_invocation_id,
    first.origin.unwrap().build_invocation_id
  );
  assert_eq!(fixture.invocations(), 1);
}

#[tokio::test]
async fn test_changed_input_reexecutes() {
  let fixture = Fixture::new();
  let executor = || fixture.services().create_work_executor();

  executor().execute(Arc::new(fixture.work())).await;
  std::fs::write(&fixture.input, "changed").unwrap();

  let result = executor().execute(Arc::new(fixture.work())).await;
  assert_eq!(result.state, ExecutionState::Success);
  assert_eq!(result.outcome.unwrap().outcome, ExecutionOutcome::Executed);
  assert_eq!(fixture.invocations(), 2);
  assert_eq!(
    std::fs::read_to_string(fixture.output_dir.join("output.txt")).unwrap(),
    "CHANGED"
  );
}

#[tokio::test]
async fn test_modified_output_reexecutes() {
  let fixture = Fixture::new();
  let executor = || fixture.services().create_work_executor();

  executor().execute(Arc::new(fixture.work())).await;
  std::fs::write(fixture.output_dir.join("output.txt"), "tampered").unwrap();

  let result = executor().execute(Arc::new(fixture.work())).await;
  assert_eq!(result.outcome.unwrap().outcome, ExecutionOutcome::Executed);
  assert_eq!(fixture.invocations(), 2);
}

#[tokio::test]
async fn test_changed_implementation_reexecutes() {
  let fixture = Fixture::new();
  let executor = || fixture.services().create_work_executor();

  executor().execute(Arc::new(fixture.work())).await;

  let mut work = fixture.work();
  work.implementation = "upper-v2".to_string();
  let result = executor().execute(Arc::new(work)).await;
  assert_eq!(result.outcome.unwrap().outcome, ExecutionOutcome::Executed);
  assert_eq!(fixture.invocations(), 2);
}

#[tokio::test]
async fn test_cache_hit_restores_outputs() {
  let fixture = Fixture::new();
  let cache = Arc::new(InMemoryBuildCache::new());

  let first = fixture
    .services()
    .with_build_cache(cache.clone())
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(first.outcome.unwrap().outcome, ExecutionOutcome::Executed);
  assert_eq!(cache.len(), 1);

  // No history and no workspace: only the cache can help.
  std::fs::remove_dir_all(&fixture.output_dir).unwrap();
  let history = Arc::new(InMemoryExecutionHistoryStore::new());
  let second = ExecutionServices::new(history.clone())
    .with_build_cache(cache.clone())
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;

  assert_eq!(second.state, ExecutionState::Success);
  let output = second.outcome.unwrap();
  assert_eq!(output.outcome, ExecutionOutcome::FromCache);
  assert_eq!(output.files, vec![fixture.output_dir.join("output.txt")]);
  assert_eq!(
    std::fs::read_to_string(fixture.output_dir.join("output.txt")).unwrap(),
    "HELLO"
  );
  assert_eq!(fixture.invocations(), 1);

  // loaded results are recorded, so the next build is up to date
  assert_eq!(history.len(), 1);
  let third = ExecutionServices::new(history)
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(third.state, ExecutionState::UpToDate);
}

#[tokio::test]
async fn test_timeout_fails_work() {
  let fixture = Fixture::new();
  let mut work = fixture
    .work()
    .with_behavior(Behavior::Sleep(Duration::from_millis(500)));
  work.timeout = Some(Duration::from_millis(20));

  let result = fixture
    .services()
    .create_work_executor()
    .execute(Arc::new(work))
    .await;
  assert_eq!(result.state, ExecutionState::Failed);
  let error = result.outcome.unwrap_err();
  assert!(error.is_timeout(), "unexpected error: {error}");
}

#[tokio::test]
async fn test_retry_after_timeout_waits_for_abandoned_work() {
  let fixture = Fixture::new();
  let services = fixture.services();
  let executor = services.create_work_executor();

  let mut slow = fixture
    .work()
    .with_behavior(Behavior::Sleep(Duration::from_millis(300)));
  slow.timeout = Some(Duration::from_millis(20));
  let timed_out = executor.execute(Arc::new(slow)).await;
  assert!(timed_out.outcome.unwrap_err().is_timeout());

  // the abandoned run still holds the workspace
  let retry = executor
    .execute(Arc::new(fixture.work().with_behavior(Behavior::Lower)))
    .await;
  assert_eq!(retry.state, ExecutionState::Success);
  assert_eq!(fixture.invocations(), 2);
  assert!(!services.output_locks().is_locked(&fixture.output_dir));

  // nothing from the abandoned run lands after the retry
  tokio::time::sleep(Duration::from_millis(350)).await;
  assert_eq!(
    std::fs::read_to_string(fixture.output_dir.join("output.txt")).unwrap(),
    "hello"
  );
}

/// Records each announced location with the invocation count at that time.
struct RecordingChanges {
  invocations: Arc<AtomicUsize>,
  seen: Mutex<Vec<(PathBuf, usize)>>,
}

impl OutputChangeListener for RecordingChanges {
  fn before_output_change(&self, affected: &[PathBuf]) {
    let invocations = self.invocations.load(Ordering::SeqCst);
    let mut seen = self.seen.lock().unwrap();
    seen.extend(affected.iter().map(|path| (path.clone(), invocations)));
  }
}

#[tokio::test]
async fn test_output_changes_are_announced_before_writes() {
  let fixture = Fixture::new();
  let cache = Arc::new(InMemoryBuildCache::new());
  let changes = Arc::new(RecordingChanges {
    invocations: fixture.invocations.clone(),
    seen: Mutex::new(vec![]),
  });
  let seen = || changes.seen.lock().unwrap().clone();

  let services = fixture
    .services()
    .with_build_cache(cache.clone())
    .with_output_change_listener(changes.clone());
  assert!(!services.snapshotter().snapshot(&fixture.output_dir).unwrap().exists());

  let first = services
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(first.outcome.unwrap().outcome, ExecutionOutcome::Executed);
  // announced once, before the work ran
  assert_eq!(seen(), vec![(fixture.output_dir.clone(), 0)]);
  // the stale snapshot taken before the run was dropped
  assert!(services.snapshotter().snapshot(&fixture.output_dir).unwrap().exists());

  let up_to_date = fixture
    .services()
    .with_output_change_listener(changes.clone())
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(up_to_date.state, ExecutionState::UpToDate);
  assert_eq!(seen().len(), 1);

  let loaded = ExecutionServices::new(Arc::new(InMemoryExecutionHistoryStore::new()))
    .with_build_cache(cache)
    .with_output_change_listener(changes.clone())
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(loaded.outcome.unwrap().outcome, ExecutionOutcome::FromCache);
  assert_eq!(
    seen(),
    vec![(fixture.output_dir.clone(), 0), (fixture.output_dir.clone(), 1)]
  );
  assert_eq!(fixture.invocations(), 1);
}

#[tokio::test]
async fn test_cancelled_before_execution() {
  let fixture = Fixture::new();
  let cancel = CancellationToken::new();
  cancel.cancel();

  let result = fixture
    .services()
    .with_cancellation(cancel)
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;
  assert_eq!(result.state, ExecutionState::Failed);
  assert!(result.outcome.unwrap_err().is_cancellation());
  assert_eq!(fixture.invocations(), 0);

  // cancelled runs leave no history behind
  assert!(
    fixture
      .history
      .load("upper:input.txt")
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn test_cancelled_during_execution() {
  let fixture = Fixture::new();
  let cancel = CancellationToken::new();
  let work = fixture
    .work()
    .with_behavior(Behavior::Sleep(Duration::from_millis(300)));

  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    trigger.cancel();
  });

  let result = fixture
    .services()
    .with_cancellation(cancel)
    .create_work_executor()
    .execute(Arc::new(work))
    .await;
  assert_eq!(result.state, ExecutionState::Failed);
  assert!(result.outcome.unwrap_err().is_cancellation());
}

#[tokio::test]
async fn test_panic_is_contained() {
  let fixture = Fixture::new();
  let result = fixture
    .services()
    .create_work_executor()
    .execute(Arc::new(fixture.work().with_behavior(Behavior::Panic)))
    .await;

  assert_eq!(result.state, ExecutionState::Failed);
  match result.outcome.unwrap_err() {
    ExecutionError::Panicked { message, .. } => assert_eq!(message, "transform exploded"),
    other => panic!("expected panic failure, got {other}"),
  }
}

#[tokio::test]
async fn test_failure_is_recorded_and_rerun() {
  let fixture = Fixture::new();
  let executor = || fixture.services().create_work_executor();

  let failed = executor()
    .execute(Arc::new(fixture.work().with_behavior(Behavior::Fail)))
    .await;
  assert_eq!(failed.state, ExecutionState::Failed);

  let recorded = fixture
    .history
    .load("upper:input.txt")
    .await
    .unwrap()
    .unwrap();
  assert!(!recorded.successful);

  // same inputs, but the last run failed
  let result = executor().execute(Arc::new(fixture.work())).await;
  assert_eq!(result.outcome.unwrap().outcome, ExecutionOutcome::Executed);
  assert_eq!(fixture.invocations(), 2);
}

#[tokio::test]
async fn test_outputs_are_recorded() {
  let fixture = Fixture::new();
  let output_files = Arc::new(InMemoryOutputFilesRepository::new());

  fixture
    .services()
    .with_output_files(output_files.clone())
    .create_work_executor()
    .execute(Arc::new(fixture.work()))
    .await;

  assert!(output_files.is_generated_by_build(&fixture.output_dir.join("output.txt")));
  assert!(!output_files.is_generated_by_build(&fixture.input));
}

#[tokio::test]
async fn test_missing_input_fails_before_execution() {
  let fixture = Fixture::new();
  let mut work = fixture.work();
  work.input = fixture.output_dir.join("missing").join("nested.txt");

  let result = fixture
    .services()
    .create_work_executor()
    .execute(Arc::new(work))
    .await;

  // a missing file snapshots as Missing; the work itself then fails to read it
  assert_eq!(result.state, ExecutionState::Failed);
  assert!(matches!(
    result.outcome.unwrap_err(),
    ExecutionError::Invocation { .. }
  ));
}
