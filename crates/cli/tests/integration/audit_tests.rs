//! Audit command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn missing_help_fails() {
  let env = TestEnv::with_sakefile(
    "\
compile:
  formula: cc -c main.c
",
  );

  env
    .sake_cmd()
    .arg("audit")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("target 'compile' has no help string"));
}

#[test]
fn missing_formula_fails_with_meta_target_hint() {
  let env = TestEnv::with_sakefile(
    "\
compile:
  help: compile things
  dependencies: [main.c]
",
  );

  env
    .sake_cmd()
    .arg("audit")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("has no formula"))
    .stderr(predicate::str::contains("meta-target"));
}

#[test]
fn empty_all_passes_with_warning() {
  let env = TestEnv::with_sakefile(
    "\
all:
compile:
  help: compile things
  formula: 'true'
",
  );

  env
    .sake_cmd()
    .arg("audit")
    .assert()
    .success()
    .stderr(predicate::str::contains("'all' is empty"));
}

#[test]
fn audit_failure_stops_build() {
  let env = TestEnv::with_sakefile(
    "\
compile:
  formula: echo built > built
",
  );

  env.sake_cmd().arg("build").assert().code(1);
  assert!(!env.exists("built"));
  assert!(!env.exists(".shastore"));
}

#[test]
fn audit_json_lists_warnings() {
  let env = TestEnv::with_sakefile(
    "\
compile:
  help: compile things
  formula: 'true'
  flavour: spicy
",
  );

  env
    .sake_cmd()
    .args(["--output", "json", "audit"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"ok\": true"))
    .stdout(predicate::str::contains("flavour"));
}
