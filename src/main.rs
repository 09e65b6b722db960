use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kiln_config::{ChainDef, KilnConfig};
use kiln_execution::{DirWorkspaceProvider, ExecutionServices, FsExecutionHistoryStore, LocalBuildCache};
use kiln_graph::{
  AsyncArtifactListener, BuildOperationRunner, NoopTransformListener, OperationQueue, ResolveOnlyListener,
  ResolvedArtifact, TransformationChain, TransformationStep, TransformerInvoker, TransformingArtifactListener,
};
use kiln_transform::{ArtifactId, ScopeContext, Subject, builtin_transformer};

/// Kiln - incremental artifact transforms
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.kiln)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON executor config
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Number of transforms allowed to run at once
  #[arg(long, global = true)]
  parallelism: Option<usize>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a transform chain over its inputs
  Run {
    /// Path to the chain definition (JSON)
    chain_file: PathBuf,
  },

  /// Delete workspaces, execution history and the local build cache
  Clean,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let config = load_config(&cli)?;

  match cli.command {
    Some(Commands::Run { chain_file }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_chain(chain_file, config))
    }
    Some(Commands::Clean) => clean(&config),
    None => {
      println!("kiln - use --help to see available commands");
      Ok(())
    }
  }
}

fn load_config(cli: &Cli) -> Result<KilnConfig> {
  let mut config = match &cli.config {
    Some(path) => KilnConfig::load(path).with_context(|| format!("failed to load config: {}", path.display()))?,
    None => KilnConfig::default(),
  };

  if let Some(parallelism) = cli.parallelism {
    config.parallelism = parallelism;
  }
  if let Some(dir) = &cli.data_dir {
    config.data_dir = Some(dir.clone());
  }
  if config.data_dir.is_none() {
    let home = dirs::home_dir().context("could not determine home directory")?;
    config.data_dir = Some(home.join(".kiln"));
  }

  config.validate().context("invalid executor config")?;
  Ok(config)
}

fn data_dir(config: &KilnConfig) -> Result<&Path> {
  config.data_dir.as_deref().context("no data directory configured")
}

async fn run_chain(chain_file: PathBuf, config: KilnConfig) -> Result<()> {
  let chain = ChainDef::load(&chain_file).with_context(|| format!("failed to load chain: {}", chain_file.display()))?;
  let data_dir = data_dir(&config)?;

  info!(chain = %chain.name, inputs = chain.inputs.len(), steps = chain.steps.len(), "loaded chain");

  let cancel = CancellationToken::new();
  let mut services = ExecutionServices::new(Arc::new(FsExecutionHistoryStore::new(data_dir.join("history"))))
    .with_cancellation(cancel.clone());
  if config.build_cache.enabled {
    if let Some(cache_dir) = config.cache_dir() {
      services = services.with_build_cache(Arc::new(LocalBuildCache::new(cache_dir)));
    }
  }

  {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        info!("interrupt received, cancelling");
        cancel.cancel();
      }
    });
  }

  let invoker = Arc::new(
    TransformerInvoker::from_services(
      &services,
      Arc::new(DirWorkspaceProvider::new(data_dir.join("workspaces"))),
    )
    .with_timeout(config.transform_timeout()),
  );

  let mut steps = Vec::with_capacity(chain.steps.len());
  for step in &chain.steps {
    let transformer = builtin_transformer(&step.transform, &step.params)
      .with_context(|| format!("invalid step '{}'", step.transform))?;
    steps.push(Arc::new(TransformationStep::new(transformer, invoker.clone())));
  }

  let queue = Arc::new(OperationQueue::new());
  let listener = TransformingArtifactListener::new(
    Arc::new(TransformationChain::new(steps)),
    Arc::new(ResolveOnlyListener),
    queue.clone(),
    Arc::new(Mutex::new(HashMap::new())),
    Arc::new(Mutex::new(HashMap::new())),
    ScopeContext::new(&chain.scope),
    Arc::new(NoopTransformListener),
  );

  let mut ids = Vec::with_capacity(chain.inputs.len());
  for input in &chain.inputs {
    let id = artifact_id(&input.path, input.component.as_deref())?;
    match &id {
      Some(id) => {
        let artifact = ResolvedArtifact {
          id: id.clone(),
          file: input.path.clone(),
        };
        listener.artifact_available(&artifact).await;
      }
      None => listener.file_available(&input.path).await,
    }
    ids.push(id);
  }

  let runner = BuildOperationRunner::new(config.parallelism).context("failed to create operation runner")?;
  runner.run_all(&queue).await.context("transform operations failed")?;

  let artifacts = listener.artifact_results().lock().unwrap_or_else(|e| e.into_inner()).clone();
  let files = listener.file_results().lock().unwrap_or_else(|e| e.into_inner()).clone();

  let mut output = Vec::with_capacity(chain.inputs.len());
  for (input, id) in chain.inputs.iter().zip(&ids) {
    let operation = match id {
      Some(id) => artifacts.get(id).cloned(),
      None => files.get(&input.path).cloned(),
    };
    if let Some(operation) = operation {
      output.push(subject_json(operation.transformed_subject().await));
    }
  }

  println!("{}", serde_json::to_string_pretty(&Value::Array(output))?);
  Ok(())
}

/// Inputs naming a component are artifacts; the rest are loose files.
fn artifact_id(path: &Path, component: Option<&str>) -> Result<Option<ArtifactId>> {
  let Some(component) = component else {
    return Ok(None);
  };
  let file_name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .with_context(|| format!("input has no file name: {}", path.display()))?;
  Ok(Some(ArtifactId::new(component, file_name)))
}

fn subject_json(subject: &Subject) -> Value {
  match subject.files() {
    Ok(files) => json!({
      "display_name": subject.display_name(),
      "files": files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>(),
    }),
    Err(_) => json!({
      "display_name": subject.display_name(),
      "failure": subject.failure().map(|e| e.to_string()),
    }),
  }
}

fn clean(config: &KilnConfig) -> Result<()> {
  let data_dir = data_dir(config)?;
  let mut targets = vec![data_dir.join("workspaces"), data_dir.join("history")];
  if let Some(cache_dir) = config.cache_dir() {
    targets.push(cache_dir);
  }

  for target in targets {
    match std::fs::remove_dir_all(&target) {
      Ok(()) => info!(path = %target.display(), "removed"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e).with_context(|| format!("failed to remove {}", target.display())),
    }
  }
  Ok(())
}
