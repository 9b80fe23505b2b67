//! Raw-text macro expansion.
//!
//! A Sakefile may define macros on lines of the form `#! NAME = value`. Every
//! later `$NAME` in the text is replaced by the value. Because definition lines
//! start with `#`, YAML treats them as comments once expansion is done.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

static DEFINITION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^#!\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$").expect("valid macro regex"));

static REFERENCE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid macro regex"));

/// Expand `#!` macro definitions in `text`.
///
/// `overrides` win over in-file definitions of the same name. References to
/// names that are never defined are left untouched, so shell variables in
/// formulas (`$HOME`, `$@`) pass through.
pub fn expand_macros(text: &str, overrides: &BTreeMap<String, String>) -> String {
  let mut macros = overrides.clone();
  let mut expanded = String::with_capacity(text.len());

  for line in text.split_inclusive('\n') {
    let body = line.trim_end_matches(['\n', '\r']);

    if let Some(caps) = DEFINITION.captures(body) {
      let name = &caps[1];
      if overrides.contains_key(name) {
        debug!(name, "macro definition shadowed by override");
      } else {
        let value = substitute(&caps[2], &macros);
        debug!(name, value = %value, "macro defined");
        macros.insert(name.to_string(), value);
      }
      expanded.push_str(line);
      continue;
    }

    expanded.push_str(&substitute(line, &macros));
  }

  expanded
}

fn substitute(text: &str, macros: &BTreeMap<String, String>) -> String {
  REFERENCE
    .replace_all(text, |caps: &Captures<'_>| match macros.get(&caps[1]) {
      Some(value) => value.clone(),
      None => caps[0].to_string(),
    })
    .into_owned()
}
