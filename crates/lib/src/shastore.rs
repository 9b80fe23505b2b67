//! The `.shastore` hash store.
//!
//! Maps root-relative file paths to the SHA-1 digest they had after the last
//! successful build of the targets that use them. The file is a small YAML
//! document:
//!
//! ```text
//! ---
//! main.c: 2aae6c35c94fcfb415dbe95f408b9ce91ee846ed
//! main.o: 9d4e1e23bd5b727046a9e3b4b7db57bd8d6ee684
//! ...
//! ```
//!
//! A missing or unreadable-as-YAML store is treated as empty. Writes merge with
//! what is already on disk, so building a subgraph never forgets the digests
//! of files outside it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::graph::{BuildGraph, Target, paths};
use crate::util::hash::{HashError, get_sha};

/// File name of the store inside the project root.
pub const SHASTORE_FILENAME: &str = ".shastore";

/// Path to digest map. Ordered so the store is written deterministically.
pub type ShaMap = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize hash store: {0}")]
  Serialize(#[from] serde_yaml::Error),
}

/// Handle to one `.shastore` file.
#[derive(Debug, Clone)]
pub struct HashStore {
  path: PathBuf,
}

impl HashStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// The store belonging to the project rooted at `root`.
  pub fn in_dir(root: &Path) -> Self {
    Self::new(root.join(SHASTORE_FILENAME))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the store. Missing or unparseable files load as empty.
  pub fn load(&self) -> Result<ShaMap, StoreError> {
    Ok(self.read()?.unwrap_or_default())
  }

  /// Make sure the store exists and parses before a build reads it.
  ///
  /// A missing or unparseable store is replaced by an empty document. Returns
  /// the digests recorded by previous builds.
  pub fn bootstrap(&self) -> Result<ShaMap, StoreError> {
    match self.read()? {
      Some(shas) => Ok(shas),
      None => {
        debug!(path = %self.path.display(), "bootstrapping empty hash store");
        write_shas_to_shastore(&self.path, &ShaMap::new())?;
        Ok(ShaMap::new())
      }
    }
  }

  /// Merge `in_mem` over the digests currently on disk and write the result.
  pub fn merge_and_write(&self, in_mem: &ShaMap) -> Result<ShaMap, StoreError> {
    let from_store = self.load()?;
    let merged = merge_from_store_and_in_mems(&from_store, in_mem);
    write_shas_to_shastore(&self.path, &merged)?;
    debug!(path = %self.path.display(), entries = merged.len(), "hash store written");
    Ok(merged)
  }

  /// Put each of `keys` back to its value in `previous`, dropping keys that
  /// `previous` lacks, and write the store if anything changed.
  ///
  /// Used when a build stops early: digests recorded by targets that finished
  /// must not hide changes from the targets that did not.
  pub fn restore_and_write(&self, keys: &BTreeSet<String>, previous: &ShaMap) -> Result<ShaMap, StoreError> {
    let mut shas = self.load()?;
    let restored = restore_keys(&mut shas, keys, previous);
    if restored > 0 {
      write_shas_to_shastore(&self.path, &shas)?;
      debug!(path = %self.path.display(), restored, "hash store rolled back");
    }
    Ok(shas)
  }

  /// `None` when the file is missing or does not parse.
  fn read(&self) -> Result<Option<ShaMap>, StoreError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(StoreError::Read {
          path: self.path.clone(),
          source,
        });
      }
    };

    match serde_yaml::from_str::<Option<ShaMap>>(&content) {
      Ok(shas) => Ok(Some(shas.unwrap_or_default())),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "ignoring unparseable hash store");
        Ok(None)
      }
    }
  }
}

/// Serialize `shas` to `path` as a start/end-marked YAML document.
///
/// The file is replaced atomically.
pub fn write_shas_to_shastore(path: &Path, shas: &ShaMap) -> Result<(), StoreError> {
  let mut document = String::from("---\n");
  if !shas.is_empty() {
    document.push_str(&serde_yaml::to_string(shas)?);
  }
  document.push_str("...\n");

  let write_err = |source| StoreError::Write {
    path: path.to_path_buf(),
    source,
  };

  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
  temp.write_all(document.as_bytes()).map_err(write_err)?;
  temp.persist(path).map_err(|e| write_err(e.error))?;

  Ok(())
}

/// Overlay `in_mem` on `from_store`.
///
/// Entries only in the old store are carried over; entries in both take the
/// new value.
pub fn merge_from_store_and_in_mems(from_store: &ShaMap, in_mem: &ShaMap) -> ShaMap {
  let mut merged = from_store.clone();
  merged.extend(in_mem.iter().map(|(k, v)| (k.clone(), v.clone())));
  merged
}

/// Reset `keys` in `shas` to their values in `previous`. Returns how many
/// entries changed.
pub fn restore_keys(shas: &mut ShaMap, keys: &BTreeSet<String>, previous: &ShaMap) -> usize {
  let mut changed = 0;
  for key in keys {
    let old = previous.get(key);
    if shas.get(key) == old {
      continue;
    }
    match old {
      Some(value) => {
        shas.insert(key.clone(), value.clone());
      }
      None => {
        shas.remove(key);
      }
    }
    changed += 1;
  }
  changed
}

/// Digests of every dependency and output file of every target that exists.
///
/// Glob entries are expanded; paths that do not exist yet are left out.
pub fn take_shas_of_all_files(graph: &BuildGraph) -> Result<ShaMap, HashError> {
  let mut shas = ShaMap::new();
  let mut seen = HashSet::new();

  for (_, target) in graph.targets() {
    let entries = target.dependencies.iter().chain(&target.outputs);
    for entry in entries {
      for path in paths::expand(entry, graph.root()) {
        if seen.insert(path.clone()) {
          hash_if_file(graph.root(), &path, &mut shas)?;
        }
      }
    }
  }

  debug!(files = shas.len(), "hashed project files");
  Ok(shas)
}

/// Current digests of one target's dependency and output files.
pub fn take_shas_of_target(root: &Path, target: &Target) -> Result<ShaMap, HashError> {
  let mut shas = ShaMap::new();
  for path in paths_of_target(root, target) {
    hash_if_file(root, &path, &mut shas)?;
  }
  Ok(shas)
}

/// Store keys a target's dependencies and outputs expand to right now.
pub fn paths_of_target(root: &Path, target: &Target) -> BTreeSet<String> {
  target
    .dependencies
    .iter()
    .chain(&target.outputs)
    .flat_map(|entry| paths::expand(entry, root))
    .collect()
}

/// Current digests of one target's output files.
pub fn take_shas_of_outputs(root: &Path, target: &Target) -> Result<ShaMap, HashError> {
  let mut shas = ShaMap::new();
  for entry in &target.outputs {
    for path in paths::expand(entry, root) {
      hash_if_file(root, &path, &mut shas)?;
    }
  }
  Ok(shas)
}

fn hash_if_file(root: &Path, path: &str, shas: &mut ShaMap) -> Result<(), HashError> {
  let full = root.join(path);
  if full.is_file() {
    shas.insert(path.to_string(), get_sha(&full)?);
  }
  Ok(())
}
