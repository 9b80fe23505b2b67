//! Sakefile integrity auditing.
//!
//! The auditor validates the shape of a parsed [`Sakefile`] before any graph
//! work happens. It stops at the first invalid target. Problems that do not
//! prevent a build (an empty `all`, unknown fields) come back as warnings.

use std::fmt;

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

use crate::sakefile::{ALL, DEPENDENCIES, FORMULA, HELP, OUTPUT, Sakefile, is_meta_target, scalar_to_string};

/// A target as named in diagnostics, with its meta-target if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
  pub name: String,
  pub parent: Option<String>,
}

impl TargetRef {
  fn top(name: &str) -> Self {
    Self {
      name: name.to_string(),
      parent: None,
    }
  }

  fn child(name: &str, parent: &str) -> Self {
    Self {
      name: name.to_string(),
      parent: Some(parent.to_string()),
    }
  }
}

impl fmt::Display for TargetRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.parent {
      Some(parent) => write!(f, "target '{}' (in meta-target '{}')", self.name, parent),
      None => write!(f, "target '{}'", self.name),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditWarning {
  /// `all` is present but lists nothing.
  EmptyAll,
  /// `all` is present but is not a list of names; it is ignored.
  MalformedAll,
  /// A target carries a field sake does not know about; it is ignored.
  UnknownField { target: TargetRef, field: String },
}

impl fmt::Display for AuditWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AuditWarning::EmptyAll => write!(f, "'all' is empty"),
      AuditWarning::MalformedAll => write!(f, "'all' is not a list of target names and will be ignored"),
      AuditWarning::UnknownField { target, field } => {
        write!(f, "{target} has unrecognized field '{field}' which will be ignored")
      }
    }
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
  #[error("Sakefile is empty")]
  Empty,

  #[error("{0} must be a mapping of fields")]
  NotAMapping(TargetRef),

  #[error("{0} has no help string")]
  MissingHelp(TargetRef),

  #[error(
    "{0} has no formula\n\
     If this was meant to be a meta-target, it needs at least one sub-target (meta-targets cannot be nested)"
  )]
  MissingFormula(TargetRef),

  #[error("meta-target '{0}' has no sub-targets")]
  EmptyMetaTarget(String),

  #[error("meta-target '{parent}' has field '{field}' which is not a sub-target")]
  MalformedChild { parent: String, field: String },

  #[error("{target} field '{field}' must be {expected}")]
  InvalidField {
    target: TargetRef,
    field: String,
    expected: &'static str,
  },
}

/// Check the whole Sakefile.
///
/// Processes `all` first (always leniently), then every other entry in file
/// order. Returns the collected warnings on success.
pub fn check_integrity(sakefile: &Sakefile) -> Result<Vec<AuditWarning>, AuditError> {
  if sakefile.is_empty() {
    return Err(AuditError::Empty);
  }

  let mut warnings = Vec::new();

  if let Some(all) = sakefile.get(ALL) {
    match all {
      Value::Null => warnings.push(AuditWarning::EmptyAll),
      Value::Sequence(items) if items.is_empty() => warnings.push(AuditWarning::EmptyAll),
      Value::Sequence(items) if items.iter().all(|i| i.as_str().is_some()) => {}
      _ => warnings.push(AuditWarning::MalformedAll),
    }
  }

  for (name, value) in sakefile.entries().filter(|(name, _)| *name != ALL) {
    debug!(name, "auditing target");
    warnings.extend(check_entry(name, value)?);
  }

  debug!(warnings = warnings.len(), "audit passed");

  Ok(warnings)
}

/// Check one top-level entry, which may be a flat target or a meta-target.
fn check_entry(name: &str, value: &Value) -> Result<Vec<AuditWarning>, AuditError> {
  let Value::Mapping(fields) = value else {
    return Err(AuditError::NotAMapping(TargetRef::top(name)));
  };

  if is_meta_target(fields) {
    return check_meta_target(name, fields);
  }

  if fields.len() == 1 && fields.contains_key(HELP) {
    return Err(AuditError::EmptyMetaTarget(name.to_string()));
  }

  check_target_integrity(&TargetRef::top(name), value)
}

fn check_meta_target(name: &str, fields: &Mapping) -> Result<Vec<AuditWarning>, AuditError> {
  if !fields.contains_key(HELP) {
    return Err(AuditError::MissingHelp(TargetRef::top(name)));
  }

  let mut warnings = Vec::new();
  for (key, child) in fields {
    let child_name = scalar_to_string(key).unwrap_or_else(|| format!("{key:?}"));
    if child_name == HELP {
      continue;
    }
    if !child.is_mapping() {
      return Err(AuditError::MalformedChild {
        parent: name.to_string(),
        field: child_name,
      });
    }
    warnings.extend(check_target_integrity(&TargetRef::child(&child_name, name), child)?);
  }

  Ok(warnings)
}

/// Check a single flat target: it needs `help` and `formula`, and the path
/// fields must be lists of strings when present.
pub fn check_target_integrity(target: &TargetRef, value: &Value) -> Result<Vec<AuditWarning>, AuditError> {
  let Value::Mapping(fields) = value else {
    return Err(AuditError::NotAMapping(target.clone()));
  };

  match fields.get(HELP) {
    None | Some(Value::Null) => return Err(AuditError::MissingHelp(target.clone())),
    Some(help) if help.as_str().is_none() => return Err(invalid(target, HELP, "a string")),
    Some(_) => {}
  }

  match fields.get(FORMULA) {
    None | Some(Value::Null) => return Err(AuditError::MissingFormula(target.clone())),
    Some(formula) if formula.as_str().is_none() => return Err(invalid(target, FORMULA, "a string")),
    Some(_) => {}
  }

  for field in [DEPENDENCIES, OUTPUT] {
    match fields.get(field) {
      None | Some(Value::Null) | Some(Value::String(_)) => {}
      Some(Value::Sequence(items)) if items.iter().all(Value::is_string) => {}
      Some(_) => return Err(invalid(target, field, "a list of paths")),
    }
  }

  let warnings = fields
    .keys()
    .filter_map(|key| {
      let field = scalar_to_string(key).unwrap_or_else(|| format!("{key:?}"));
      (![HELP, FORMULA, DEPENDENCIES, OUTPUT].contains(&field.as_str())).then(|| AuditWarning::UnknownField {
        target: target.clone(),
        field,
      })
    })
    .collect();

  Ok(warnings)
}

fn invalid(target: &TargetRef, field: &str, expected: &'static str) -> AuditError {
  AuditError::InvalidField {
    target: target.clone(),
    field: field.to_string(),
    expected,
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;

  fn audit(text: &str) -> Result<Vec<AuditWarning>, AuditError> {
    let sakefile = Sakefile::parse(text, &BTreeMap::new()).unwrap();
    check_integrity(&sakefile)
  }

  #[test]
  fn valid_flat_target_passes() {
    let warnings = audit("compile:\n  help: compile it\n  formula: cc -c main.c\n").unwrap();
    assert!(warnings.is_empty());
  }

  #[test]
  fn empty_sakefile_fails() {
    assert_eq!(audit(""), Err(AuditError::Empty));
  }

  #[test]
  fn only_empty_all_passes_with_warning() {
    let warnings = audit("all:\n").unwrap();
    assert_eq!(warnings, vec![AuditWarning::EmptyAll]);

    let warnings = audit("all: []\n").unwrap();
    assert_eq!(warnings, vec![AuditWarning::EmptyAll]);
  }

  #[test]
  fn malformed_all_is_only_a_warning() {
    let warnings = audit("all:\n  nested: thing\n").unwrap();
    assert_eq!(warnings, vec![AuditWarning::MalformedAll]);
  }

  #[test]
  fn missing_help_names_the_target() {
    let err = audit("compile:\n  formula: cc -c main.c\n").unwrap_err();
    assert_eq!(err, AuditError::MissingHelp(TargetRef::top("compile")));
    assert!(err.to_string().contains("'compile'"));
  }

  #[test]
  fn missing_formula_hints_at_meta_target() {
    let err = audit("compile:\n  help: compile it\n  dependencies: [main.c]\n").unwrap_err();
    assert_eq!(err, AuditError::MissingFormula(TargetRef::top("compile")));
    assert!(err.to_string().contains("meta-target"));
  }

  #[test]
  fn help_only_entry_is_empty_meta_target() {
    let err = audit("group:\n  help: a group\n").unwrap_err();
    assert_eq!(err, AuditError::EmptyMetaTarget("group".to_string()));
  }

  #[test]
  fn meta_target_children_are_audited() {
    let text = "\
group:
  help: a group
  first:
    help: first
    formula: 'true'
  second:
    help: second
";
    let err = audit(text).unwrap_err();
    assert_eq!(err, AuditError::MissingFormula(TargetRef::child("second", "group")));
    assert!(err.to_string().contains("in meta-target 'group'"));
  }

  #[test]
  fn meta_target_needs_help() {
    let text = "group:\n  first:\n    help: first\n    formula: 'true'\n";
    let err = audit(text).unwrap_err();
    assert_eq!(err, AuditError::MissingHelp(TargetRef::top("group")));
  }

  #[test]
  fn meta_target_rejects_non_target_fields() {
    let text = "\
group:
  help: a group
  dependencies: [x]
  first:
    help: first
    formula: 'true'
";
    let err = audit(text).unwrap_err();
    assert!(matches!(err, AuditError::MalformedChild { ref field, .. } if field == "dependencies"));
  }

  #[test]
  fn unknown_fields_are_warnings() {
    let text = "compile:\n  help: h\n  formula: 'true'\n  colour: blue\n";
    let warnings = audit(text).unwrap();
    assert_eq!(
      warnings,
      vec![AuditWarning::UnknownField {
        target: TargetRef::top("compile"),
        field: "colour".to_string(),
      }]
    );
  }

  #[test]
  fn first_failure_aborts() {
    let text = "a:\n  formula: 'true'\nb:\n  help: b\n";
    assert_eq!(audit(text), Err(AuditError::MissingHelp(TargetRef::top("a"))));
  }

  #[test]
  fn path_fields_must_be_string_lists() {
    let text = "a:\n  help: a\n  formula: 'true'\n  output:\n    x: y\n";
    let err = audit(text).unwrap_err();
    assert!(matches!(err, AuditError::InvalidField { ref field, .. } if field == "output"));
  }

  #[test]
  fn scalar_entry_is_not_a_target() {
    assert_eq!(audit("a: hello\n"), Err(AuditError::NotAMapping(TargetRef::top("a"))));
  }

  #[test]
  fn names_with_spaces_are_fine() {
    let text = "build the docs:\n  help: docs\n  formula: 'true'\n";
    assert!(audit(text).is_ok());
  }
}
