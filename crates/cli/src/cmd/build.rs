//! Implementation of the `sake build` command.
//!
//! Loads and audits the Sakefile, builds the dependency graph, narrows it to
//! the requested targets and runs whatever is stale.

use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::debug;

use sake_lib::{BuildGraph, BuildOptions, build_this_graph};

use crate::output::{OutputFormat, print_build_summary, print_json, print_recon};

use super::Project;

/// Build flags from the command line.
pub struct BuildFlags {
  pub force: bool,
  pub recon: bool,
  pub parallel: bool,
  pub quiet: bool,
  pub shell: Option<String>,
}

/// Execute the build command.
///
/// With no targets named, builds the targets listed under `all`, or every
/// target when there is no `all`. Named targets (or meta-targets) are built
/// together with everything they depend on.
pub fn cmd_build(project: &Project, targets: &[String], flags: BuildFlags, format: OutputFormat) -> Result<()> {
  let loaded = project.load()?;
  if !format.is_json() {
    loaded.print_warnings();
  }

  let graph = BuildGraph::construct(&loaded.sakefile, &loaded.root).context("Failed to construct build graph")?;

  let selected = if targets.is_empty() {
    loaded.sakefile.default_targets()
  } else {
    targets.to_vec()
  };
  let graph = if selected.is_empty() {
    graph
  } else {
    debug!(targets = ?selected, "selecting subgraph");
    graph.subgraph(&selected)?
  };

  let options = BuildOptions {
    quiet: flags.quiet,
    force: flags.force,
    recon: flags.recon,
    parallel: flags.parallel,
    shell: flags.shell,
  };

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(build_this_graph(&graph, &options)).context("Build failed")?;

  if format.is_json() {
    print_json(&report)?;
  } else if options.recon {
    print_recon(&report);
  } else {
    print_build_summary(&report, graph.len(), started.elapsed());
  }

  if !report.is_success() {
    let names: Vec<&str> = report.failed.iter().map(|f| f.target.as_str()).collect();
    bail!("Build failed: {}", names.join(", "));
  }

  Ok(())
}
