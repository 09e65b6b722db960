//! Built-in transform actions.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_execution::BoxError;
use serde::Deserialize;
use serde_json::Value;

use crate::dependencies::ArtifactDependencies;
use crate::error::TransformError;
use crate::transformer::{DefaultTransformer, TransformAction, Transformer};

/// Copies the primary input (file or directory) into the output directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyAction {
  /// Prepended to the copied file name.
  #[serde(default)]
  pub prefix: String,
}

impl TransformAction for CopyAction {
  fn transform(
    &self,
    primary_input: &Path,
    output_dir: &Path,
    _dependencies: &dyn ArtifactDependencies,
  ) -> Result<Option<Vec<PathBuf>>, BoxError> {
    let name = file_name(primary_input)?;
    let target = output_dir.join(format!("{}{}", self.prefix, name));
    if primary_input.is_dir() {
      copy_tree(primary_input, &target)?;
    } else {
      fs::copy(primary_input, &target)?;
    }
    Ok(Some(vec![target]))
  }
}

/// Writes `<name>.blake3` holding the hex digest of the primary input.
///
/// With `include_dependencies`, the digests of the upstream dependency
/// files are appended, one per line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChecksumAction {
  #[serde(default)]
  pub include_dependencies: bool,
}

impl TransformAction for ChecksumAction {
  fn transform(
    &self,
    primary_input: &Path,
    output_dir: &Path,
    dependencies: &dyn ArtifactDependencies,
  ) -> Result<Option<Vec<PathBuf>>, BoxError> {
    let name = file_name(primary_input)?;
    let mut content = format!("{}\n", blake3::hash(&fs::read(primary_input)?).to_hex());
    if self.include_dependencies {
      for dependency in dependencies.files()? {
        let digest = blake3::hash(&fs::read(&dependency)?);
        content.push_str(&format!("{} {}\n", digest.to_hex(), dependency.display()));
      }
    }

    let target = output_dir.join(format!("{name}.blake3"));
    fs::write(&target, content)?;
    Ok(Some(vec![target]))
  }
}

/// Returns the primary input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughAction;

impl TransformAction for PassThroughAction {
  fn transform(
    &self,
    primary_input: &Path,
    _output_dir: &Path,
    _dependencies: &dyn ArtifactDependencies,
  ) -> Result<Option<Vec<PathBuf>>, BoxError> {
    Ok(Some(vec![primary_input.to_path_buf()]))
  }
}

fn file_name(path: &Path) -> Result<String, BoxError> {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .ok_or_else(|| format!("{} has no file name", path.display()).into())
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
  fs::create_dir_all(to)?;
  for entry in fs::read_dir(from)? {
    let entry = entry?;
    let target = to.join(entry.file_name());
    if entry.file_type()?.is_dir() {
      copy_tree(&entry.path(), &target)?;
    } else {
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

fn parse_params<T: for<'de> Deserialize<'de> + Default>(transform: &str, params: &Value) -> Result<T, TransformError> {
  if params.is_null() {
    return Ok(T::default());
  }
  serde_json::from_value(params.clone()).map_err(|e| TransformError::InvalidParameters {
    transform: transform.to_string(),
    message: e.to_string(),
  })
}

/// Look up a built-in transform by name.
pub fn builtin_transformer(name: &str, params: &Value) -> Result<Arc<dyn Transformer>, TransformError> {
  let transformer = match name {
    "copy" => {
      let action: CopyAction = parse_params(name, params)?;
      DefaultTransformer::new(name, params, Arc::new(action))
    }
    "checksum" => {
      let action: ChecksumAction = parse_params(name, params)?;
      let include_dependencies = action.include_dependencies;
      let transformer = DefaultTransformer::new(name, params, Arc::new(action));
      if include_dependencies {
        transformer.with_dependencies()
      } else {
        transformer
      }
    }
    "pass-through" => DefaultTransformer::new(name, params, Arc::new(PassThroughAction)),
    other => return Err(TransformError::UnknownTransform(other.to_string())),
  };
  Ok(Arc::new(transformer))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dependencies::{FixedDependencies, NoDependencies};
  use serde_json::json;

  #[test]
  fn test_copy_file_with_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.txt");
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(&input, "alpha").unwrap();

    let transformer = builtin_transformer("copy", &json!({ "prefix": "copied-" })).unwrap();
    let outputs = transformer.transform(&input, &out, &NoDependencies).unwrap();
    assert_eq!(outputs, vec![out.join("copied-a.txt")]);
    assert_eq!(fs::read_to_string(out.join("copied-a.txt")).unwrap(), "alpha");
  }

  #[test]
  fn test_copy_directory() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("classes");
    fs::create_dir_all(input.join("pkg")).unwrap();
    fs::write(input.join("pkg/A.class"), "a").unwrap();
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let outputs = builtin_transformer("copy", &Value::Null)
      .unwrap()
      .transform(&input, &out, &NoDependencies)
      .unwrap();
    assert_eq!(outputs, vec![out.join("classes")]);
    assert_eq!(fs::read_to_string(out.join("classes/pkg/A.class")).unwrap(), "a");
  }

  #[test]
  fn test_checksum_with_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.jar");
    let dep = dir.path().join("dep.jar");
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(&input, "a").unwrap();
    fs::write(&dep, "dep").unwrap();

    let transformer = builtin_transformer("checksum", &json!({ "include_dependencies": true })).unwrap();
    assert!(transformer.requires_dependencies());

    let outputs = transformer
      .transform(&input, &out, &FixedDependencies(vec![dep.clone()]))
      .unwrap();
    assert_eq!(outputs, vec![out.join("a.jar.blake3")]);
    let content = fs::read_to_string(out.join("a.jar.blake3")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], blake3::hash(b"a").to_hex().as_str());
    assert!(lines[1].ends_with(&dep.display().to_string()));
  }

  #[test]
  fn test_pass_through_returns_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.jar");
    fs::write(&input, "a").unwrap();
    let outputs = builtin_transformer("pass-through", &json!({}))
      .unwrap()
      .transform(&input, dir.path(), &NoDependencies)
      .unwrap();
    assert_eq!(outputs, vec![input]);
  }

  #[test]
  fn test_unknown_and_invalid() {
    assert!(matches!(
      builtin_transformer("minify", &json!({})),
      Err(TransformError::UnknownTransform(name)) if name == "minify"
    ));
    assert!(matches!(
      builtin_transformer("copy", &json!({ "bogus": true })),
      Err(TransformError::InvalidParameters { .. })
    ));
  }
}
