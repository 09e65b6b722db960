//! Subjects: the immutable values flowing through a transform chain.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// Failure recorded in a failed subject.
pub type Failure = Arc<dyn Error + Send + Sync + 'static>;

/// Identifies a resolved artifact: the file it names within a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId {
  pub component: String,
  pub file_name: String,
}

impl ArtifactId {
  pub fn new(component: impl Into<String>, file_name: impl Into<String>) -> Self {
    Self {
      component: component.into(),
      file_name: file_name.into(),
    }
  }
}

impl fmt::Display for ArtifactId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.file_name, self.component)
  }
}

/// The resolution context a subject was produced under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeContext(Arc<str>);

impl ScopeContext {
  pub fn new(name: &str) -> Self {
    Self(Arc::from(name))
  }

  pub fn name(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ScopeContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

enum SubjectKind {
  Failed {
    display_name: String,
    failure: Failure,
  },
  Initial {
    file: PathBuf,
    artifact_id: Option<ArtifactId>,
    scope: ScopeContext,
  },
  /// Output of a successful transform. Lineage is read through `previous`.
  Transformed { previous: Subject, files: Vec<PathBuf> },
}

/// A set of files plus lineage, or a terminal failure.
///
/// Subjects are never mutated; every transition creates a new one. Clones
/// are cheap.
#[derive(Clone)]
pub struct Subject {
  kind: Arc<SubjectKind>,
}

impl Subject {
  pub fn failed(display_name: impl Into<String>, failure: Failure) -> Self {
    Self::from_kind(SubjectKind::Failed {
      display_name: display_name.into(),
      failure,
    })
  }

  /// A subject that starts from a bare file.
  pub fn initial_file(file: impl Into<PathBuf>, scope: ScopeContext) -> Self {
    Self::from_kind(SubjectKind::Initial {
      file: file.into(),
      artifact_id: None,
      scope,
    })
  }

  /// A subject that starts from a resolved artifact.
  pub fn initial_artifact(artifact_id: ArtifactId, file: impl Into<PathBuf>, scope: ScopeContext) -> Self {
    Self::from_kind(SubjectKind::Initial {
      file: file.into(),
      artifact_id: Some(artifact_id),
      scope,
    })
  }

  fn from_kind(kind: SubjectKind) -> Self {
    Self { kind: Arc::new(kind) }
  }

  /// The successor of this subject, keeping its lineage and display name.
  pub fn transformation_successful(&self, files: Vec<PathBuf>) -> Self {
    Self::from_kind(SubjectKind::Transformed {
      previous: self.clone(),
      files,
    })
  }

  /// A failed subject carrying this subject's display name.
  pub fn transformation_failed(&self, failure: Failure) -> Self {
    Self::failed(self.display_name(), failure)
  }

  /// The files to transform. Fails for a failed subject.
  pub fn files(&self) -> Result<&[PathBuf], TransformError> {
    match self.kind.as_ref() {
      SubjectKind::Failed { display_name, .. } => Err(TransformError::FailedSubject {
        display_name: display_name.clone(),
      }),
      SubjectKind::Initial { file, .. } => Ok(std::slice::from_ref(file)),
      SubjectKind::Transformed { files, .. } => Ok(files),
    }
  }

  pub fn failure(&self) -> Option<&Failure> {
    match self.kind.as_ref() {
      SubjectKind::Failed { failure, .. } => Some(failure),
      _ => None,
    }
  }

  pub fn is_failed(&self) -> bool {
    self.failure().is_some()
  }

  /// The originating artifact, if the chain started from one.
  pub fn artifact_id(&self) -> Option<&ArtifactId> {
    match self.kind.as_ref() {
      SubjectKind::Failed { .. } => None,
      SubjectKind::Initial { artifact_id, .. } => artifact_id.as_ref(),
      SubjectKind::Transformed { previous, .. } => previous.artifact_id(),
    }
  }

  /// `None` for a failed subject.
  pub fn scope(&self) -> Option<&ScopeContext> {
    match self.kind.as_ref() {
      SubjectKind::Failed { .. } => None,
      SubjectKind::Initial { scope, .. } => Some(scope),
      SubjectKind::Transformed { previous, .. } => previous.scope(),
    }
  }

  pub fn display_name(&self) -> String {
    match self.kind.as_ref() {
      SubjectKind::Failed { display_name, .. } => display_name.clone(),
      SubjectKind::Initial {
        artifact_id: Some(id),
        ..
      } => format!("artifact {id}"),
      SubjectKind::Initial { file, .. } => format!("file {}", file.display()),
      SubjectKind::Transformed { previous, .. } => previous.display_name(),
    }
  }
}

impl fmt::Display for Subject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.display_name())
  }
}

impl fmt::Debug for Subject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut debug = f.debug_struct("Subject");
    debug.field("display_name", &self.display_name());
    match self.files() {
      Ok(files) => debug.field("files", &files),
      Err(_) => debug.field("failure", &self.failure().map(|e| e.to_string())),
    };
    debug.finish()
  }
}
