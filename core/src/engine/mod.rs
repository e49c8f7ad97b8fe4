// dwi-connectome/src/engine/mod.rs

//! Execution of a finalized step graph. The driver only sees
//! [`ExecutionEngine`]; [`LocalEngine`] is the in-process implementation.

pub mod cache;
pub mod local;
pub mod runner;

pub use cache::NodeCache;
pub use local::LocalEngine;
pub use runner::{Invocation, ProcessRunner, ToolRunner};

use crate::config::ProcessingConfig;
use crate::error::DwiResult;
use crate::workflow::StepGraph;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// Where and how to run one graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
  pub work_dir: PathBuf,
  pub publish_dir: PathBuf,
  pub n_threads: usize,
  pub rerun: bool,
}

impl ExecutionRequest {
  pub fn from_config(config: &ProcessingConfig) -> Self {
    Self {
      work_dir: config.graph_work_dir().to_path_buf(),
      publish_dir: config.subject_output_dir().to_path_buf(),
      n_threads: config.n_threads(),
      rerun: config.rerun(),
    }
  }
}

/// Which nodes ran and which were satisfied from the cache, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
  pub executed: Vec<String>,
  pub cached: Vec<String>,
}

impl ExecutionReport {
  pub fn total(&self) -> usize {
    self.executed.len() + self.cached.len()
  }
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
  /// Runs every node of `graph`. The first failing node aborts the run with a
  /// `WorkflowExecution` error.
  async fn execute(&self, graph: &StepGraph, request: &ExecutionRequest) -> DwiResult<ExecutionReport>;
}
