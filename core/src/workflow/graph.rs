// dwi-connectome/src/workflow/graph.rs

//! The step graph: nodes are tool invocations with named ports, edges are the
//! step-output bindings between them.
//!
//! A node can only bind outputs of nodes already in the graph, so every graph
//! that `add_node` accepts is acyclic. `topological_groups` re-checks this.

use super::tools::{NodeIo, ToolInvocation};
use crate::error::{DwiError, DwiResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Where a piece of data comes from: a named output of an earlier step, or a
/// file that already exists outside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataHandle {
  StepOutput { step: String, output: String },
  External(PathBuf),
}

impl DataHandle {
  pub fn step_output(step: impl Into<String>, output: impl Into<String>) -> Self {
    DataHandle::StepOutput {
      step: step.into(),
      output: output.into(),
    }
  }

  pub fn external(path: impl Into<PathBuf>) -> Self {
    DataHandle::External(path.into())
  }

  pub fn producer(&self) -> Option<&str> {
    match self {
      DataHandle::StepOutput { step, .. } => Some(step),
      DataHandle::External(_) => None,
    }
  }
}

/// A file a node writes. Published files land in the subject output directory,
/// everything else in the node's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
  pub file_name: String,
  pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepNode {
  name: String,
  tool: ToolInvocation,
  inputs: BTreeMap<String, DataHandle>,
  outputs: BTreeMap<String, OutputFile>,
}

impl StepNode {
  pub fn new(name: impl Into<String>, tool: ToolInvocation) -> Self {
    Self {
      name: name.into(),
      tool,
      inputs: BTreeMap::new(),
      outputs: BTreeMap::new(),
    }
  }

  pub fn input(mut self, port: &str, handle: DataHandle) -> Self {
    self.inputs.insert(port.to_string(), handle);
    self
  }

  /// Binds zero or more extra inputs, e.g. an optional correction input.
  pub fn inputs_from<'p>(mut self, bindings: impl IntoIterator<Item = (&'p str, DataHandle)>) -> Self {
    for (port, handle) in bindings {
      self.inputs.insert(port.to_string(), handle);
    }
    self
  }

  pub fn output(mut self, port: &str, file_name: impl Into<String>) -> Self {
    self.outputs.insert(
      port.to_string(),
      OutputFile {
        file_name: file_name.into(),
        published: false,
      },
    );
    self
  }

  pub fn published_output(mut self, port: &str, file_name: impl Into<String>) -> Self {
    self.outputs.insert(
      port.to_string(),
      OutputFile {
        file_name: file_name.into(),
        published: true,
      },
    );
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn tool(&self) -> &ToolInvocation {
    &self.tool
  }

  pub fn inputs(&self) -> &BTreeMap<String, DataHandle> {
    &self.inputs
  }

  pub fn outputs(&self) -> &BTreeMap<String, OutputFile> {
    &self.outputs
  }

  /// Steps whose outputs this node consumes.
  pub fn upstream(&self) -> BTreeSet<&str> {
    self.inputs.values().filter_map(DataHandle::producer).collect()
  }

  /// Ports must match what the tool declares, exactly.
  fn check_ports(&self) -> DwiResult<()> {
    let expected_in: BTreeSet<&str> = self.tool.input_ports().into_iter().collect();
    let expected_out: BTreeSet<&str> = self.tool.output_ports().into_iter().collect();
    let bound_in: BTreeSet<&str> = self.inputs.keys().map(String::as_str).collect();
    let bound_out: BTreeSet<&str> = self.outputs.keys().map(String::as_str).collect();

    let mut problems = Vec::new();
    for port in expected_in.difference(&bound_in) {
      problems.push(format!("missing input '{}'", port));
    }
    for port in bound_in.difference(&expected_in) {
      problems.push(format!("unexpected input '{}'", port));
    }
    for port in expected_out.difference(&bound_out) {
      problems.push(format!("missing output '{}'", port));
    }
    for port in bound_out.difference(&expected_out) {
      problems.push(format!("unexpected output '{}'", port));
    }
    if problems.is_empty() {
      Ok(())
    } else {
      Err(DwiError::build(
        &self.name,
        format!("{} ports do not match: {}", self.tool.program(), problems.join(", ")),
      ))
    }
  }
}

/// `from.output -> to.input`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
  pub from: String,
  pub output: String,
  pub to: String,
  pub input: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepGraph {
  nodes: Vec<StepNode>,
  #[serde(skip)]
  index: HashMap<String, usize>,
  edges: Vec<Edge>,
}

impl StepGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a node after checking its name, ports and every upstream binding.
  pub fn add_node(&mut self, node: StepNode) -> DwiResult<()> {
    if self.index.contains_key(&node.name) {
      return Err(DwiError::build(&node.name, "duplicate step name"));
    }
    node.check_ports()?;

    let mut new_edges = Vec::new();
    for (port, handle) in &node.inputs {
      let DataHandle::StepOutput { step, output } = handle else {
        continue;
      };
      let Some(source) = self.node(step) else {
        return Err(DwiError::build(
          &node.name,
          format!("input '{}' references step '{}' which is not in the graph", port, step),
        ));
      };
      if !source.outputs.contains_key(output) {
        return Err(DwiError::build(
          &node.name,
          format!("input '{}' references '{}.{}', which that step does not produce", port, step, output),
        ));
      }
      let edge = Edge {
        from: step.clone(),
        output: output.clone(),
        to: node.name.clone(),
        input: port.clone(),
      };
      if self.edges.contains(&edge) || new_edges.contains(&edge) {
        return Err(DwiError::build(&node.name, format!("duplicate edge {}.{} -> {}", step, output, port)));
      }
      new_edges.push(edge);
    }

    self.index.insert(node.name.clone(), self.nodes.len());
    self.nodes.push(node);
    self.edges.extend(new_edges);
    Ok(())
  }

  pub fn node(&self, name: &str) -> Option<&StepNode> {
    self.index.get(name).map(|&i| &self.nodes[i])
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  /// Nodes in insertion order.
  pub fn nodes(&self) -> &[StepNode] {
    &self.nodes
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Nodes running the given program.
  pub fn nodes_running<'a>(&'a self, program: &'a str) -> impl Iterator<Item = &'a StepNode> + 'a {
    self.nodes.iter().filter(move |n| n.tool.program() == program)
  }

  /// Kahn's algorithm, grouping nodes whose dependencies are all satisfied.
  /// Groups are in dependency order; nodes within a group are independent and
  /// keep insertion order.
  pub fn topological_groups(&self) -> DwiResult<Vec<Vec<&StepNode>>> {
    let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.upstream().len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
    for (idx, node) in self.nodes.iter().enumerate() {
      for up in node.upstream() {
        let Some(&up_idx) = self.index.get(up) else {
          return Err(DwiError::build(&node.name, format!("dangling dependency on '{}'", up)));
        };
        dependents[up_idx].push(idx);
      }
    }

    let mut groups = Vec::new();
    let mut processed = vec![false; self.nodes.len()];
    let mut remaining = self.nodes.len();
    while remaining > 0 {
      let ready: Vec<usize> = (0..self.nodes.len())
        .filter(|&i| !processed[i] && in_degree[i] == 0)
        .collect();
      if ready.is_empty() {
        let stuck: Vec<&str> = (0..self.nodes.len())
          .filter(|&i| !processed[i])
          .map(|i| self.nodes[i].name.as_str())
          .collect();
        return Err(DwiError::build("graph", format!("cycle detected among {:?}", stuck)));
      }
      for &i in &ready {
        processed[i] = true;
        for &dep in &dependents[i] {
          in_degree[dep] -= 1;
        }
      }
      remaining -= ready.len();
      groups.push(ready.into_iter().map(|i| &self.nodes[i]).collect());
    }
    Ok(groups)
  }

  /// Flattened topological order.
  pub fn topological_order(&self) -> DwiResult<Vec<&StepNode>> {
    Ok(self.topological_groups()?.into_iter().flatten().collect())
  }
}

/// Maps data handles and output files to concrete paths for one run.
#[derive(Debug, Clone)]
pub struct PathResolver {
  work_dir: PathBuf,
  publish_dir: PathBuf,
}

impl PathResolver {
  pub fn new(work_dir: impl Into<PathBuf>, publish_dir: impl Into<PathBuf>) -> Self {
    Self {
      work_dir: work_dir.into(),
      publish_dir: publish_dir.into(),
    }
  }

  pub fn node_dir(&self, step: &str) -> PathBuf {
    self.work_dir.join(step)
  }

  pub fn publish_dir(&self) -> &Path {
    &self.publish_dir
  }

  pub fn output_path(&self, step: &str, file: &OutputFile) -> PathBuf {
    if file.published {
      self.publish_dir.join(&file.file_name)
    } else {
      self.node_dir(step).join(&file.file_name)
    }
  }

  pub fn resolve(&self, graph: &StepGraph, handle: &DataHandle) -> DwiResult<PathBuf> {
    match handle {
      DataHandle::External(path) => Ok(path.clone()),
      DataHandle::StepOutput { step, output } => graph
        .node(step)
        .and_then(|n| n.outputs.get(output))
        .map(|file| self.output_path(step, file))
        .ok_or_else(|| DwiError::build(step, format!("output '{}' cannot be resolved", output))),
    }
  }

  /// Resolves every port of `node` into a render-ready [`NodeIo`].
  pub fn node_io<'a>(&self, graph: &StepGraph, node: &'a StepNode, n_threads: usize) -> DwiResult<NodeIo<'a>> {
    let mut inputs = BTreeMap::new();
    for (port, handle) in &node.inputs {
      inputs.insert(port.clone(), self.resolve(graph, handle)?);
    }
    let outputs = node
      .outputs
      .iter()
      .map(|(port, file)| (port.clone(), self.output_path(&node.name, file)))
      .collect();
    Ok(NodeIo::new(&node.name, inputs, outputs, n_threads))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;
  use crate::workflow::tools::{IN, NOISE, OUT};

  fn convert() -> StepNode {
    StepNode::new("mrconvert", ToolInvocation::ConvertDwi)
      .input(IN, DataHandle::external("/b/dwi.nii.gz"))
      .input("bvec", DataHandle::external("/b/dwi.bvec"))
      .input("bval", DataHandle::external("/b/dwi.bval"))
      .output(OUT, "dwi.mif")
  }

  fn denoise(from: &str) -> StepNode {
    StepNode::new("dwidenoise", ToolInvocation::Denoise)
      .input(IN, DataHandle::step_output(from, OUT))
      .output(OUT, "denoised.mif")
      .output(NOISE, "noise.mif")
  }

  #[test]
  fn forward_reference_is_rejected() {
    let mut graph = StepGraph::new();
    let err = graph.add_node(denoise("mrconvert")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WorkflowBuild);
    assert!(graph.is_empty());
  }

  #[test]
  fn duplicate_names_and_unknown_outputs_are_rejected() {
    let mut graph = StepGraph::new();
    graph.add_node(convert()).unwrap();
    assert!(graph.add_node(convert()).is_err());

    let bad = StepNode::new("degibbs", ToolInvocation::Degibbs)
      .input(IN, DataHandle::step_output("mrconvert", "noise"))
      .output(OUT, "degibbs.mif");
    assert!(graph.add_node(bad).is_err());
  }

  #[test]
  fn port_mismatch_is_rejected() {
    let mut graph = StepGraph::new();
    let missing_bval = StepNode::new("mrconvert", ToolInvocation::ConvertDwi)
      .input(IN, DataHandle::external("/b/dwi.nii.gz"))
      .input("bvec", DataHandle::external("/b/dwi.bvec"))
      .output(OUT, "dwi.mif");
    let err = graph.add_node(missing_bval).unwrap_err();
    assert!(err.to_string().contains("missing input 'bval'"));
  }

  #[test]
  fn groups_follow_dependencies() {
    let mut graph = StepGraph::new();
    graph.add_node(convert()).unwrap();
    graph.add_node(denoise("mrconvert")).unwrap();
    let groups = graph.topological_groups().unwrap();
    let names: Vec<Vec<&str>> = groups.iter().map(|g| g.iter().map(|n| n.name()).collect()).collect();
    assert_eq!(names, vec![vec!["mrconvert"], vec!["dwidenoise"]]);
    assert_eq!(graph.edges().len(), 1);
  }

  #[test]
  fn resolver_places_published_files_in_output() {
    let mut graph = StepGraph::new();
    graph.add_node(convert()).unwrap();
    let resolver = PathResolver::new("/w", "/o/sub-01");
    let path = resolver
      .resolve(&graph, &DataHandle::step_output("mrconvert", OUT))
      .unwrap();
    assert_eq!(path, PathBuf::from("/w/mrconvert/dwi.mif"));

    let published = OutputFile {
      file_name: "connectome_dk_counts.csv".into(),
      published: true,
    };
    assert_eq!(
      resolver.output_path("tck2connectome_dk", &published),
      PathBuf::from("/o/sub-01/connectome_dk_counts.csv")
    );
  }
}
