//! Build execution.
//!
//! Walks a [`BuildGraph`] and runs the formula of every stale target. It
//! handles:
//! - serial execution in topological order
//! - level-by-level execution with concurrent targets inside a level
//! - recon runs that only report what would happen
//! - persisting digests to `.shastore` as targets succeed
//!
//! A failed formula stops the build after the current step or level. Digests
//! of targets that already succeeded stay recorded, so the next build resumes
//! from the failure. Keys of targets that did not finish are rolled back to
//! their pre-build values, so those targets still see what changed.

pub mod cmd;
pub mod stale;
pub mod types;

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::graph::{BuildGraph, TargetId};
use crate::shastore::{
  HashStore, ShaMap, paths_of_target, take_shas_of_all_files, take_shas_of_outputs, take_shas_of_target,
};

pub use cmd::{CmdError, run_commands};
pub use stale::{Staleness, needs_to_run};
pub use types::{BuildError, BuildOptions, BuildReport, TargetFailure};

/// Build every stale target of `graph`.
///
/// Formula failures are reported in [`BuildReport::failed`]; errors reading
/// files or writing the store abort the build with a [`BuildError`].
pub async fn build_this_graph(graph: &BuildGraph, options: &BuildOptions) -> Result<BuildReport, BuildError> {
  info!(
    targets = graph.len(),
    parallel = options.parallel,
    recon = options.recon,
    "starting build"
  );

  let store = HashStore::in_dir(graph.root());
  let from_store = if options.recon { store.load()? } else { store.bootstrap()? };
  let in_mem = take_shas_of_all_files(graph)?;

  let mut builder = Builder {
    graph,
    options,
    store,
    from_store,
    in_mem,
    settled: HashSet::new(),
    report: BuildReport::default(),
  };

  if options.parallel {
    builder.run_levels().await?;
  } else {
    builder.run_serial().await?;
  }

  if !builder.report.is_success() {
    builder.roll_back_unsettled()?;
  }

  let report = builder.report;
  info!(
    ran = report.ran.len(),
    up_to_date = report.up_to_date.len(),
    failed = report.failed.len(),
    "build finished"
  );
  Ok(report)
}

/// State carried through one build.
struct Builder<'a> {
  graph: &'a BuildGraph,
  options: &'a BuildOptions,
  store: HashStore,
  /// Digests recorded by earlier builds. Not updated during this build.
  from_store: ShaMap,
  /// Digests of files as they are now.
  in_mem: ShaMap,
  /// Targets that ran successfully or were found up to date.
  settled: HashSet<TargetId>,
  report: BuildReport,
}

impl Builder<'_> {
  async fn run_serial(&mut self) -> Result<(), BuildError> {
    for id in self.graph.topological_order()? {
      if !self.is_stale(id) {
        continue;
      }

      let target = self.graph.target(id);
      if self.options.recon {
        self.report.would_run.push(vec![target.name.clone()]);
        continue;
      }

      info!(name = %target.name, "running target");
      let result = run_commands(
        &target.formula,
        self.graph.root(),
        self.options.quiet,
        self.options.shell.as_deref(),
      )
      .await;

      match result {
        Ok(()) => {
          let recorded = self.record_success(id)?;
          self.store.merge_and_write(&recorded)?;
        }
        Err(e) => {
          self.record_failure(id, e);
          break;
        }
      }
    }

    Ok(())
  }

  async fn run_levels(&mut self) -> Result<(), BuildError> {
    let levels = self.graph.parallel_levels()?;
    debug!(levels = levels.len(), "computed parallel levels");

    for (index, level) in levels.into_iter().enumerate() {
      let stale: Vec<TargetId> = level.into_iter().filter(|id| self.is_stale(*id)).collect();
      if stale.is_empty() {
        continue;
      }

      let names: Vec<String> = stale.iter().map(|id| self.graph.target(*id).name.clone()).collect();
      if self.options.recon {
        self.report.would_run.push(names);
        continue;
      }

      info!(level = index, targets = ?names, "running level");
      let results = if let [id] = stale[..] {
        let target = self.graph.target(id);
        let result = run_commands(
          &target.formula,
          self.graph.root(),
          self.options.quiet,
          self.options.shell.as_deref(),
        )
        .await;
        vec![(id, result)]
      } else {
        self.run_batch(&stale).await?
      };

      let mut recorded = ShaMap::new();
      let mut failed = false;
      for (id, result) in results {
        match result {
          Ok(()) => recorded.extend(self.record_success(id)?),
          Err(e) => {
            self.record_failure(id, e);
            failed = true;
          }
        }
      }

      if !recorded.is_empty() {
        self.store.merge_and_write(&recorded)?;
      }
      if failed {
        break;
      }
    }

    Ok(())
  }

  /// Run every target in `batch` at once and wait for all of them.
  ///
  /// Results come back in `batch` order.
  async fn run_batch(&self, batch: &[TargetId]) -> Result<Vec<(TargetId, Result<(), CmdError>)>, BuildError> {
    let mut join_set = JoinSet::new();

    for &id in batch {
      let formula = self.graph.target(id).formula.clone();
      let root: PathBuf = self.graph.root().to_path_buf();
      let quiet = self.options.quiet;
      let shell = self.options.shell.clone();

      join_set.spawn(async move { (id, run_commands(&formula, &root, quiet, shell.as_deref()).await) });
    }

    let mut results = Vec::with_capacity(batch.len());
    while let Some(joined) = join_set.join_next().await {
      results.push(joined?);
    }
    results.sort_by_key(|(id, _)| batch.iter().position(|b| b == id));

    Ok(results)
  }

  fn is_stale(&mut self, id: TargetId) -> bool {
    let target = self.graph.target(id);
    let staleness = needs_to_run(
      self.graph.root(),
      target,
      &self.in_mem,
      &self.from_store,
      self.options.force,
    );

    if staleness.is_stale() {
      debug!(name = %target.name, reason = %staleness, "target is stale");
      true
    } else {
      debug!(name = %target.name, "target is up to date");
      self.report.up_to_date.push(target.name.clone());
      self.settled.insert(id);
      false
    }
  }

  /// Refresh output digests after a successful run and return the digests to
  /// persist for this target.
  fn record_success(&mut self, id: TargetId) -> Result<ShaMap, BuildError> {
    let target = self.graph.target(id);
    info!(name = %target.name, "target succeeded");

    self.in_mem.extend(take_shas_of_outputs(self.graph.root(), target)?);
    self.report.ran.push(target.name.clone());
    self.settled.insert(id);

    Ok(take_shas_of_target(self.graph.root(), target)?)
  }

  fn record_failure(&mut self, id: TargetId, error: CmdError) {
    let target = self.graph.target(id);
    warn!(name = %target.name, error = %error, "target failed");
    self.report.failed.push(TargetFailure::new(&target.name, error));
  }

  /// Undo this build's store updates for every path a failed or unvisited
  /// target touches.
  ///
  /// A producer that succeeded has already recorded the new digest of a file
  /// its consumer never got to read; without this the consumer would look up
  /// to date on the next build.
  fn roll_back_unsettled(&self) -> Result<(), BuildError> {
    let mut keys = BTreeSet::new();
    for (id, target) in self.graph.targets() {
      if !self.settled.contains(&id) {
        keys.extend(paths_of_target(self.graph.root(), target));
      }
    }

    debug!(paths = keys.len(), "rolling back digests of unfinished targets");
    self.store.restore_and_write(&keys, &self.from_store)?;
    Ok(())
  }
}
