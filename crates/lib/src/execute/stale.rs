//! Deciding whether a target has to run.

use std::fmt;
use std::path::Path;

use crate::graph::{Target, paths};
use crate::shastore::ShaMap;

/// Why a target is (or is not) stale. Checks apply in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
  /// `--force` was given.
  Forced,
  /// A declared output is absent, or an output glob matches nothing.
  MissingOutput(String),
  /// The target declares no dependencies, so there is nothing to compare.
  NoDependencies,
  /// A dependency file is not hashed now, or has no recorded digest.
  ///
  /// Directories are never hashed, so a literal directory dependency always
  /// lands here.
  UnrecordedDependency(String),
  /// A dependency file's digest differs from the recorded one.
  ChangedDependency(String),
  UpToDate,
}

impl Staleness {
  pub fn is_stale(&self) -> bool {
    !matches!(self, Staleness::UpToDate)
  }
}

impl fmt::Display for Staleness {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Staleness::Forced => write!(f, "forced"),
      Staleness::MissingOutput(path) => write!(f, "output '{path}' is missing"),
      Staleness::NoDependencies => write!(f, "no dependencies declared"),
      Staleness::UnrecordedDependency(path) => write!(f, "no hash to compare for '{path}'"),
      Staleness::ChangedDependency(path) => write!(f, "'{path}' changed"),
      Staleness::UpToDate => write!(f, "up to date"),
    }
  }
}

/// Decide whether `target` must run.
///
/// `in_mem` holds digests of files as they are now; `from_store` holds the
/// digests recorded by earlier successful builds.
pub fn needs_to_run(root: &Path, target: &Target, in_mem: &ShaMap, from_store: &ShaMap, force: bool) -> Staleness {
  if force {
    return Staleness::Forced;
  }

  for entry in &target.outputs {
    let missing = if paths::has_glob_chars(entry) {
      paths::expand(entry, root).is_empty()
    } else {
      !root.join(entry).exists()
    };
    if missing {
      return Staleness::MissingOutput(entry.clone());
    }
  }

  if target.dependencies.is_empty() {
    return Staleness::NoDependencies;
  }

  for entry in &target.dependencies {
    for path in paths::expand(entry, root) {
      match (in_mem.get(&path), from_store.get(&path)) {
        (Some(now), Some(recorded)) if now == recorded => {}
        (_, None) | (None, _) => return Staleness::UnrecordedDependency(path),
        (Some(_), Some(_)) => return Staleness::ChangedDependency(path),
      }
    }
  }

  Staleness::UpToDate
}
