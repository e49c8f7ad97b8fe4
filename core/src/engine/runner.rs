// dwi-connectome/src/engine/runner.rs

//! Running the commands of one node.

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{event, Level};

/// Everything needed to run one node: its command lines in order, the files
/// it must leave behind, plus where its log goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub step: String,
  pub commands: Vec<Vec<String>>,
  pub outputs: Vec<PathBuf>,
  pub node_dir: PathBuf,
  pub log_path: PathBuf,
}

impl Invocation {
  pub fn new(step: impl Into<String>, commands: Vec<Vec<String>>, node_dir: PathBuf) -> Self {
    let step = step.into();
    let log_path = node_dir.join(format!("{}_log.txt", step));
    Self {
      step,
      commands,
      outputs: Vec::new(),
      node_dir,
      log_path,
    }
  }

  pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = PathBuf>) -> Self {
    self.outputs = outputs.into_iter().collect();
    self
  }

  /// Declared outputs that do not exist on disk.
  pub fn missing_outputs(&self) -> Vec<&Path> {
    self.outputs.iter().map(PathBuf::as_path).filter(|p| !p.exists()).collect()
  }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
  async fn run(&self, invocation: &Invocation) -> anyhow::Result<()>;
}

/// Spawns each command with `tokio::process`, stdout and stderr appended to
/// the node log.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
  async fn run(&self, invocation: &Invocation) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&invocation.node_dir)
      .await
      .with_context(|| format!("creating {}", invocation.node_dir.display()))?;
    // Truncate any log left by an earlier attempt.
    std::fs::File::create(&invocation.log_path)
      .with_context(|| format!("creating {}", invocation.log_path.display()))?;

    for argv in &invocation.commands {
      let Some((program, args)) = argv.split_first() else {
        continue;
      };
      let log = std::fs::OpenOptions::new()
        .append(true)
        .open(&invocation.log_path)
        .with_context(|| format!("opening {}", invocation.log_path.display()))?;
      let log_err = log.try_clone()?;

      event!(Level::DEBUG, step = %invocation.step, command = %argv.join(" "), "Spawning tool.");
      let status = tokio::process::Command::new(program)
        .args(args)
        .current_dir(&invocation.node_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .status()
        .await
        .with_context(|| format!("spawning '{}'", program))?;

      if !status.success() {
        bail!(
          "'{}' exited with {}; see {}",
          program,
          status,
          invocation.log_path.display()
        );
      }
    }
    Ok(())
  }
}
