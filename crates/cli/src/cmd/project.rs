//! Locating and loading the Sakefile a command works on.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use sake_lib::audit::AuditWarning;
use sake_lib::{Sakefile, check_integrity, find_sakefile};

use crate::output::print_warning;

/// Where the Sakefile is and how to expand it.
pub struct Project {
  /// Explicit `--file`; searched for in the current directory when absent.
  pub file: Option<PathBuf>,
  /// `--define` macro overrides.
  pub defines: BTreeMap<String, String>,
}

/// A Sakefile that passed the audit.
pub struct Loaded {
  pub sakefile: Sakefile,
  /// Directory containing the Sakefile. Every target path is relative to it.
  pub root: PathBuf,
  pub warnings: Vec<AuditWarning>,
}

impl Project {
  pub fn sakefile_path(&self) -> Result<PathBuf> {
    match &self.file {
      Some(file) => Ok(file.clone()),
      None => {
        let cwd = env::current_dir().context("Failed to determine current directory")?;
        Ok(find_sakefile(&cwd)?)
      }
    }
  }

  /// Load, macro-expand and audit the Sakefile.
  pub fn load(&self) -> Result<Loaded> {
    let path = self.sakefile_path()?;
    let root = project_root(&path)?;
    debug!(path = %path.display(), root = %root.display(), "loading Sakefile");

    let sakefile = Sakefile::load(&path, &self.defines).with_context(|| format!("Failed to load {}", path.display()))?;
    let warnings = check_integrity(&sakefile).context("Sakefile failed audit")?;

    Ok(Loaded {
      sakefile,
      root,
      warnings,
    })
  }
}

impl Loaded {
  pub fn print_warnings(&self) {
    for warning in &self.warnings {
      print_warning(&warning.to_string());
    }
  }
}

fn project_root(sakefile: &Path) -> Result<PathBuf> {
  let dir = match sakefile.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => env::current_dir().context("Failed to determine current directory")?,
  };
  dunce::canonicalize(&dir).with_context(|| format!("Failed to resolve {}", dir.display()))
}
