// dwi-connectome/src/workflow/script.rs

//! Renders a step graph as a standalone bash script, one block per node in
//! topological order. The script is written for every run, dry or not.

use super::graph::{PathResolver, StepGraph};
use crate::config::ProcessingConfig;
use crate::error::{DwiError, DwiResult};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{event, instrument, Level};

/// Quotes one argument for bash. Plain words pass through unchanged.
pub fn shell_quote(arg: &str) -> String {
  let plain = !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || "-_./=+:,@%".contains(c));
  if plain {
    arg.to_string()
  } else {
    format!("'{}'", arg.replace('\'', r"'\''"))
  }
}

fn quote_path(path: &Path) -> String {
  shell_quote(&path.to_string_lossy())
}

#[instrument(name = "render_script", skip_all, fields(run_id = config.run_id()), err(Display))]
pub fn render_script(graph: &StepGraph, config: &ProcessingConfig) -> DwiResult<String> {
  let resolver = PathResolver::new(config.graph_work_dir(), config.subject_output_dir());
  let order = graph.topological_order()?;

  let mut script = String::new();
  let header = format!(
    "#!/usr/bin/env bash\n\
     # Diffusion connectome pipeline for {run_id}\n\
     # species: {species}, threads: {threads}, rerun: {rerun}\n\
     set -euo pipefail\n\n\
     mkdir -p {work} {publish}\n",
    run_id = config.run_id(),
    species = config.species(),
    threads = config.n_threads(),
    rerun = config.rerun(),
    work = quote_path(config.graph_work_dir()),
    publish = quote_path(config.subject_output_dir()),
  );
  script.push_str(&header);

  for node in order {
    let io = resolver.node_io(graph, node, config.n_threads())?;
    let node_dir = resolver.node_dir(node.name());
    let log = node_dir.join(format!("{}_log.txt", node.name()));
    let completion = io.output(node.tool().completion_port())?;

    let mut block = String::new();
    fmt_line(&mut block, format_args!("\n# {} ({})", node.name(), node.tool().program()))?;
    fmt_line(&mut block, format_args!("mkdir -p {}", quote_path(&node_dir)))?;

    let guarded = !config.rerun();
    let indent = if guarded { "  " } else { "" };
    if guarded {
      fmt_line(&mut block, format_args!("if [ ! -f {} ]; then", shell_quote(&completion)))?;
    }
    for (i, argv) in node.tool().command_lines(&io)?.iter().enumerate() {
      let redirect = if i == 0 { ">" } else { ">>" };
      let command: Vec<String> = argv.iter().map(|a| shell_quote(a)).collect();
      fmt_line(
        &mut block,
        format_args!("{}{} {} {} 2>&1", indent, command.join(" "), redirect, quote_path(&log)),
      )?;
    }
    if guarded {
      fmt_line(&mut block, format_args!("else\n  echo \"{} already complete, skipping\"\nfi", node.name()))?;
    }
    script.push_str(&block);
  }

  event!(Level::DEBUG, nodes = graph.len(), bytes = script.len(), "Rendered pipeline script.");
  Ok(script)
}

fn fmt_line(buf: &mut String, args: std::fmt::Arguments<'_>) -> DwiResult<()> {
  buf
    .write_fmt(args)
    .and_then(|_| buf.write_char('\n'))
    .map_err(|e| DwiError::Internal { source: e.into() })
}

/// Renders and writes the script to `config.script_path()`.
pub fn write_script(graph: &StepGraph, config: &ProcessingConfig) -> DwiResult<std::path::PathBuf> {
  let script = render_script(graph, config)?;
  let path = config.script_path();
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|e| DwiError::io(parent, e))?;
  }
  std::fs::write(&path, script).map_err(|e| DwiError::io(&path, e))?;
  event!(Level::INFO, path = %path.display(), "Pipeline script written.");
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quoting() {
    assert_eq!(shell_quote("/w/dwi.mif"), "/w/dwi.mif");
    assert_eq!(shell_quote("-nthreads"), "-nthreads");
    assert_eq!(shell_quote(" --field=/w/fm "), "' --field=/w/fm '");
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
    assert_eq!(shell_quote(""), "''");
  }
}
