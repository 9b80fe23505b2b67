//! Sakefile loading.
//!
//! A Sakefile is a YAML mapping from target names to target definitions (or
//! meta-targets grouping several targets). This module expands macros, parses
//! the YAML and exposes the entries in file order. Shape validation lives in
//! [`crate::audit`]; interpretation into targets lives in [`crate::graph`].

mod macros;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

pub use macros::expand_macros;

/// Name of the reserved aggregate entry.
pub const ALL: &str = "all";

/// Field names recognised on a target.
pub const HELP: &str = "help";
pub const FORMULA: &str = "formula";
pub const DEPENDENCIES: &str = "dependencies";
pub const OUTPUT: &str = "output";

/// File names searched, in order, when no Sakefile is given explicitly.
pub const SAKEFILE_NAMES: &[&str] = &[
  "Sakefile",
  "Sakefile.yaml",
  "Sakefile.yml",
  "sakefile",
  "sakefile.yaml",
  "sakefile.yml",
];

#[derive(Debug, Error)]
pub enum SakefileError {
  #[error("no Sakefile found in {0}")]
  NotFound(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse Sakefile: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("target names must be strings, numbers or booleans (found {0})")]
  InvalidKey(String),
}

/// A parsed Sakefile: top-level entries in the order they appear in the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sakefile {
  entries: Vec<(String, Value)>,
}

impl Sakefile {
  /// Expand macros in `text` and parse it.
  ///
  /// An empty document, or one whose root is not a mapping, yields an empty
  /// Sakefile; the auditor reports that as an error.
  pub fn parse(text: &str, overrides: &BTreeMap<String, String>) -> Result<Self, SakefileError> {
    let expanded = expand_macros(text, overrides);
    let root: Value = serde_yaml::from_str(&expanded)?;

    let Value::Mapping(mapping) = root else {
      debug!("Sakefile root is not a mapping");
      return Ok(Self::default());
    };

    let entries = mapping
      .into_iter()
      .map(|(key, value)| Ok((key_to_string(&key)?, value)))
      .collect::<Result<Vec<_>, SakefileError>>()?;

    Ok(Self { entries })
  }

  /// Read and parse the Sakefile at `path`.
  pub fn load(path: &Path, overrides: &BTreeMap<String, String>) -> Result<Self, SakefileError> {
    let text = fs::read_to_string(path).map_err(|source| SakefileError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&text, overrides)
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// All top-level entries, `all` included, in file order.
  pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.entries.iter().map(|(name, value)| (name.as_str(), value))
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
  }

  /// Names listed under `all`, if it is present and a list.
  pub fn default_targets(&self) -> Vec<String> {
    match self.get(ALL) {
      Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
      _ => Vec::new(),
    }
  }
}

/// Find the Sakefile in `dir`.
pub fn find_sakefile(dir: &Path) -> Result<PathBuf, SakefileError> {
  SAKEFILE_NAMES
    .iter()
    .map(|name| dir.join(name))
    .find(|candidate| candidate.is_file())
    .ok_or_else(|| SakefileError::NotFound(dir.to_path_buf()))
}

/// Render a scalar YAML value as a string; `None` for anything else.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// An entry without a formula whose fields include sub-target mappings.
pub(crate) fn is_meta_target(fields: &Mapping) -> bool {
  !fields.contains_key(FORMULA) && fields.values().any(Value::is_mapping)
}

fn key_to_string(key: &Value) -> Result<String, SakefileError> {
  scalar_to_string(key).ok_or_else(|| SakefileError::InvalidKey(format!("{key:?}")))
}
