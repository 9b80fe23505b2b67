//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated project directory.
///
/// Each test gets its own temporary directory holding a Sakefile and whatever
/// inputs the test writes next to it.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create a project with the given Sakefile content.
  pub fn with_sakefile(content: &str) -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_file("Sakefile", content);
    env
  }

  /// Project root, canonicalized.
  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  /// Write a file relative to the project root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Read a file relative to the project root.
  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.temp.path().join(relative_path)).unwrap()
  }

  pub fn exists(&self, relative_path: &str) -> bool {
    self.temp.path().join(relative_path).exists()
  }

  pub fn remove_file(&self, relative_path: &str) {
    std::fs::remove_file(self.temp.path().join(relative_path)).unwrap();
  }

  /// Lines appended to `log` by formulas since the last call, sorted.
  pub fn drain_log(&self) -> Vec<String> {
    let path = self.temp.path().join("log");
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    if path.exists() {
      std::fs::remove_file(&path).unwrap();
    }
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    lines.sort();
    lines
  }

  /// Get a Command for the sake binary running inside the project.
  ///
  /// `RUST_LOG` is cleared so log output does not depend on the caller.
  pub fn sake_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("sake");
    cmd.current_dir(self.root());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
