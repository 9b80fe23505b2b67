//! Implementation of the `sake audit` command.

use anyhow::Result;
use serde_json::json;

use crate::output::{OutputFormat, print_json, print_success};

use super::Project;

/// Run the integrity auditor on the Sakefile and report the result.
///
/// Audit failures propagate as errors, so the process exits non-zero.
pub fn cmd_audit(project: &Project, format: OutputFormat) -> Result<()> {
  let loaded = project.load()?;
  let targets = loaded.sakefile.entries().count();

  if format.is_json() {
    let warnings: Vec<String> = loaded.warnings.iter().map(ToString::to_string).collect();
    print_json(&json!({ "ok": true, "entries": targets, "warnings": warnings }))?;
  } else {
    loaded.print_warnings();
    print_success(&format!("Sakefile passed audit ({} entries)", targets));
  }

  Ok(())
}
