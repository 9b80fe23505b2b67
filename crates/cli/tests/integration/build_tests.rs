//! Build command integration tests.

#![cfg(unix)]

use predicates::prelude::*;

use super::common::TestEnv;

/// `compile -> link` plus an independent `docs` target, with `all` naming
/// only the binary.
const PROJECT: &str = "\
#! CC = cat
all: [link]
compile:
  help: compile the object
  dependencies: [main.c]
  output: [main.o]
  formula: $CC main.c > main.o && echo compile >> log
link:
  help: link the binary
  dependencies: [main.o]
  output: [app]
  formula: $CC main.o > app && echo link >> log
docs:
  help: render docs
  dependencies: [README]
  output: [README.html]
  formula: $CC README > README.html && echo docs >> log
";

fn project() -> TestEnv {
  let env = TestEnv::with_sakefile(PROJECT);
  env.write_file("main.c", "int main() { return 0; }\n");
  env.write_file("README", "# readme\n");
  env
}

#[test]
fn builds_default_targets() {
  let env = project();

  env.sake_cmd().arg("build").assert().success();

  assert_eq!(env.drain_log(), vec!["compile", "link"]);
  assert_eq!(env.read_file("app"), "int main() { return 0; }\n");
  assert!(!env.exists("README.html"));
}

#[test]
fn builds_named_target_and_its_dependencies() {
  let env = project();

  env.sake_cmd().args(["build", "docs"]).assert().success();

  assert_eq!(env.drain_log(), vec!["docs"]);
}

#[test]
fn second_build_runs_nothing() {
  let env = project();
  env.sake_cmd().arg("build").assert().success();
  env.drain_log();
  let store = env.read_file(".shastore");

  env
    .sake_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Everything is up to date"));

  assert!(env.drain_log().is_empty());
  assert_eq!(env.read_file(".shastore"), store);
}

#[test]
fn edit_rebuilds_downstream() {
  let env = project();
  env.sake_cmd().arg("build").assert().success();
  env.drain_log();

  env.write_file("main.c", "int main() { return 1; }\n");
  env.sake_cmd().arg("build").assert().success();

  assert_eq!(env.drain_log(), vec!["compile", "link"]);
  assert_eq!(env.read_file("app"), "int main() { return 1; }\n");
}

#[test]
fn deleted_output_is_rebuilt() {
  let env = project();
  env.sake_cmd().arg("build").assert().success();
  env.drain_log();

  env.remove_file("app");
  env.sake_cmd().arg("build").assert().success();

  assert_eq!(env.drain_log(), vec!["link"]);
}

#[test]
fn force_reruns_up_to_date_targets() {
  let env = project();
  env.sake_cmd().arg("build").assert().success();
  env.drain_log();

  env.sake_cmd().args(["build", "--force"]).assert().success();

  assert_eq!(env.drain_log(), vec!["compile", "link"]);
}

#[test]
fn recon_lists_without_running() {
  let env = project();

  env
    .sake_cmd()
    .args(["build", "--recon"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Would run"))
    .stdout(predicate::str::contains("compile"));

  assert!(env.drain_log().is_empty());
  assert!(!env.exists(".shastore"));
}

#[test]
fn parallel_build_matches_serial() {
  let env = project();

  env.sake_cmd().args(["build", "--parallel", "compile", "docs"]).assert().success();

  assert_eq!(env.drain_log(), vec!["compile", "docs"]);
  env.sake_cmd().args(["build", "-p", "compile", "docs"]).assert().success();
  assert!(env.drain_log().is_empty());
}

#[test]
fn define_overrides_macro() {
  let env = project();

  env
    .sake_cmd()
    .args(["-D", "CC=sed s/0/7/", "build", "compile"])
    .assert()
    .success();

  assert_eq!(env.read_file("main.o"), "int main() { return 7; }\n");
  assert_eq!(env.drain_log(), vec!["compile"]);
}

#[test]
fn failing_target_exits_non_zero() {
  let env = TestEnv::with_sakefile(
    "\
broken:
  help: always fails
  dependencies: [input]
  output: [never]
  formula: echo oops >&2; exit 4
",
  );
  env.write_file("input", "x");

  env
    .sake_cmd()
    .args(["--quiet", "build"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Target 'broken' failed"))
    .stderr(predicate::str::contains("status 4"))
    .stderr(predicate::str::contains("oops"));
}

#[test]
fn cycle_is_refused_before_running() {
  let env = TestEnv::with_sakefile(
    "\
a:
  help: a
  dependencies: [b.out]
  output: [a.out]
  formula: echo a >> log; touch a.out
b:
  help: b
  dependencies: [a.out]
  output: [b.out]
  formula: echo b >> log; touch b.out
",
  );

  env
    .sake_cmd()
    .arg("build")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("cycle"));

  assert!(env.drain_log().is_empty());
}

// Reads of /proc/self/mem at offset 0 fail with EIO even for root.
#[cfg(target_os = "linux")]
#[test]
fn unreadable_dependency_fails_the_build() {
  let env = TestEnv::with_sakefile(
    "\
mem:
  help: needs an unreadable file
  dependencies: [/proc/self/mem]
  output: [mem.out]
  formula: echo mem >> log; touch mem.out
",
  );

  env
    .sake_cmd()
    .arg("build")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Build failed"))
    .stderr(predicate::str::contains("proc/self/mem"));

  assert!(env.drain_log().is_empty());
  assert!(!env.exists("mem.out"));
}

#[test]
fn failed_target_is_retried_after_upstream_edit() {
  let env = TestEnv::with_sakefile(
    "\
gen:
  help: generate
  dependencies: [x.in]
  output: [gen.out]
  formula: cat x.in > gen.out
use:
  help: consume, failing while the marker exists
  dependencies: [gen.out]
  output: [use.out]
  formula: test ! -e fail && cat gen.out > use.out
",
  );
  env.write_file("x.in", "v1");
  env.sake_cmd().arg("build").assert().success();

  env.write_file("x.in", "v2");
  env.write_file("fail", "");
  env.sake_cmd().arg("build").assert().code(1);

  env.remove_file("fail");
  env.sake_cmd().arg("build").assert().success();

  assert_eq!(env.read_file("use.out"), "v2");
}

#[test]
fn unknown_target_is_an_error() {
  let env = project();

  env
    .sake_cmd()
    .args(["build", "nope"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("nope"));
}

#[test]
fn json_report() {
  let env = project();

  env
    .sake_cmd()
    .args(["-o", "json", "build"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"ran\""))
    .stdout(predicate::str::contains("\"link\""));
}
