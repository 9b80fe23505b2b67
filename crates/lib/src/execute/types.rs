//! Types for build execution.
//!
//! This module defines the options, error types and result types used when
//! walking a build graph.

use serde::Serialize;
use thiserror::Error;

use crate::graph::GraphError;
use crate::shastore::StoreError;
use crate::util::hash::HashError;

use super::cmd::CmdError;

/// Options for one build invocation.
///
/// Built once from the command line and borrowed by every stage.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  /// Capture formula output and only show it when the formula fails.
  pub quiet: bool,

  /// Treat every target as stale.
  pub force: bool,

  /// Report what would run without running anything or touching `.shastore`.
  pub recon: bool,

  /// Run independent targets of each level concurrently.
  pub parallel: bool,

  /// Shell to run formulas with.
  /// If None, uses /bin/sh (Unix) or powershell.exe (Windows).
  pub shell: Option<String>,
}

/// Errors that stop a build before or between targets.
///
/// A formula exiting non-zero is not one of these; it is recorded in
/// [`BuildReport::failed`].
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Store(#[from] StoreError),

  /// A concurrently running target's task panicked or was cancelled.
  #[error("target task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// A target whose formula failed.
#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
  pub target: String,

  /// Exit code, if the formula ran and exited normally.
  pub code: Option<i32>,

  pub message: String,

  /// Captured stdout and stderr, when running quietly.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<String>,
}

impl TargetFailure {
  pub(crate) fn new(target: &str, error: CmdError) -> Self {
    let message = error.to_string();
    match error {
      CmdError::Failed { code, stdout, stderr } => {
        let captured = [stdout, stderr]
          .into_iter()
          .filter(|s| !s.trim().is_empty())
          .collect::<Vec<_>>()
          .join("\n");
        Self {
          target: target.to_string(),
          code,
          message,
          output: (!captured.is_empty()).then_some(captured),
        }
      }
      CmdError::Spawn { .. } => Self {
        target: target.to_string(),
        code: None,
        message,
        output: None,
      },
    }
  }
}

/// Result of walking a build graph.
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
  /// Targets whose formula ran and succeeded, in execution order.
  pub ran: Vec<String>,

  /// Targets that did not need to run.
  pub up_to_date: Vec<String>,

  /// Recon only: targets that would run, one entry per serial step or
  /// parallel batch.
  pub would_run: Vec<Vec<String>>,

  /// Targets whose formula failed. The build stops after the step or batch
  /// containing the first failure.
  pub failed: Vec<TargetFailure>,
}

impl BuildReport {
  /// Returns true if no target failed.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }
}
