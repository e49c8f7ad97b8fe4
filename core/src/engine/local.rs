// dwi-connectome/src/engine/local.rs

//! In-process engine: runs topological groups in order, the nodes of a group
//! concurrently up to the thread budget, skipping nodes whose fingerprint is
//! unchanged since their last successful run and whose outputs still exist.

use super::cache::NodeCache;
use super::runner::{Invocation, ToolRunner};
use super::{ExecutionEngine, ExecutionReport, ExecutionRequest};
use crate::error::{DwiError, DwiResult};
use crate::workflow::{DataHandle, PathResolver, StepGraph, StepNode};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::Semaphore;
use tracing::{event, instrument, span, Instrument, Level};

/// Thread count used when rendering argv for fingerprints, so changing
/// `n_threads` alone does not invalidate the cache.
const FINGERPRINT_THREADS: usize = 1;

pub struct LocalEngine<R: ToolRunner> {
  runner: Arc<R>,
}

impl<R: ToolRunner> LocalEngine<R> {
  pub fn new(runner: R) -> Self {
    Self {
      runner: Arc::new(runner),
    }
  }

  pub fn with_shared_runner(runner: Arc<R>) -> Self {
    Self { runner }
  }

  pub fn runner(&self) -> &R {
    &self.runner
  }
}

/// blake3 over the canonical argv of the node, the size and modification
/// time of every external input, and the fingerprints of the nodes it
/// consumes.
pub fn fingerprint(
  graph: &StepGraph,
  node: &StepNode,
  resolver: &PathResolver,
  upstream: &HashMap<String, String>,
) -> DwiResult<String> {
  let io = resolver.node_io(graph, node, FINGERPRINT_THREADS)?;
  let mut hasher = blake3::Hasher::new();
  hasher.update(node.name().as_bytes());
  for argv in node.tool().command_lines(&io)? {
    for arg in argv {
      hasher.update(arg.as_bytes());
      hasher.update(&[0]);
    }
    hasher.update(&[b'\n']);
  }
  for (port, handle) in node.inputs() {
    if let DataHandle::External(path) = handle {
      hasher.update(port.as_bytes());
      hasher.update(file_stamp(path).as_bytes());
    }
  }
  for step in node.upstream() {
    let parent = upstream
      .get(step)
      .ok_or_else(|| DwiError::build(node.name(), format!("upstream '{}' has no fingerprint", step)))?;
    hasher.update(step.as_bytes());
    hasher.update(parent.as_bytes());
  }
  Ok(hasher.finalize().to_hex().to_string())
}

/// `<len>:<mtime ns>` of a file, or `absent`.
fn file_stamp(path: &Path) -> String {
  match std::fs::metadata(path) {
    Ok(meta) => {
      let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos());
      format!("{}:{}", meta.len(), modified)
    }
    Err(_) => "absent".to_string(),
  }
}

#[async_trait]
impl<R: ToolRunner + 'static> ExecutionEngine for LocalEngine<R> {
  #[instrument(
    name = "LocalEngine::execute",
    skip_all,
    fields(nodes = graph.len(), n_threads = request.n_threads, rerun = request.rerun),
    err(Display)
  )]
  async fn execute(&self, graph: &StepGraph, request: &ExecutionRequest) -> DwiResult<ExecutionReport> {
    for dir in [&request.work_dir, &request.publish_dir] {
      tokio::fs::create_dir_all(dir).await.map_err(|e| DwiError::io(dir, e))?;
    }
    let cache = NodeCache::load(&request.work_dir)?;
    if request.rerun {
      cache.clear()?;
    }

    let resolver = PathResolver::new(&request.work_dir, &request.publish_dir);
    let semaphore = Arc::new(Semaphore::new(request.n_threads.max(1)));
    let mut fingerprints: HashMap<String, String> = HashMap::new();
    let mut report = ExecutionReport::default();

    for (group_idx, group) in graph.topological_groups()?.into_iter().enumerate() {
      let mut pending = Vec::new();
      for node in group {
        let fp = fingerprint(graph, node, &resolver, &fingerprints)?;
        fingerprints.insert(node.name().to_string(), fp.clone());
        let io = resolver.node_io(graph, node, request.n_threads)?;
        let invocation = Invocation::new(
          node.name(),
          node.tool().command_lines(&io)?,
          resolver.node_dir(node.name()),
        )
        .with_outputs(io.output_paths().map(Path::to_path_buf));
        if cache.is_current(node.name(), &fp) {
          let missing = invocation.missing_outputs().len();
          if missing == 0 {
            event!(Level::INFO, step = node.name(), "Cache hit, skipping node.");
            report.cached.push(node.name().to_string());
            continue;
          }
          event!(Level::INFO, step = node.name(), missing, "Cached node lost outputs, running it again.");
        }
        pending.push((invocation, fp));
      }
      if pending.is_empty() {
        continue;
      }
      event!(Level::DEBUG, group = group_idx, nodes = pending.len(), "Running group.");

      let results = join_all(pending.iter().map(|(invocation, _)| {
        let semaphore = Arc::clone(&semaphore);
        let runner = Arc::clone(&self.runner);
        let node_span = span!(Level::INFO, "node_execution", step = %invocation.step);
        async move {
          let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("thread budget closed: {}", e))?;
          runner.run(invocation).await
        }
        .instrument(node_span)
      }))
      .await;

      let mut failure = None;
      for ((invocation, fp), result) in pending.iter().zip(results) {
        match result {
          Ok(()) => {
            cache.record(&invocation.step, fp)?;
            report.executed.push(invocation.step.clone());
          }
          Err(e) => {
            event!(Level::ERROR, step = %invocation.step, error = %e, "Node failed.");
            if failure.is_none() {
              failure = Some(DwiError::WorkflowExecution {
                node: invocation.step.clone(),
                report: format!("{:#}", e),
              });
            }
          }
        }
      }
      if let Some(err) = failure {
        return Err(err);
      }
    }

    event!(
      Level::INFO,
      executed = report.executed.len(),
      cached = report.cached.len(),
      "Graph execution finished."
    );
    Ok(report)
  }
}
