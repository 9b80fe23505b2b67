//! Terminal and JSON rendering for `sake`.
//!
//! Status lines go to stdout, problems to stderr. Build reports are turned
//! into plain lines first so the wording can be tested without a terminal.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use sake_lib::BuildReport;
use sake_lib::execute::TargetFailure;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

const UP_TO_DATE: &str = "Everything is up to date";

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// One line per batch a recon build would run, in run order.
fn recon_lines(report: &BuildReport) -> Vec<String> {
  report
    .would_run
    .iter()
    .map(|batch| format!("  {} {}", symbols::ARROW, batch.join(", ")))
    .collect()
}

/// Show what a recon build found stale.
pub fn print_recon(report: &BuildReport) {
  if report.would_run.is_empty() {
    print_success(UP_TO_DATE);
    return;
  }

  println!("Would run:");
  for line in recon_lines(report) {
    println!("{line}");
  }
}

/// Report a failed formula, followed by whatever it printed under `--quiet`.
pub fn print_failure(failure: &TargetFailure) {
  print_error(&format!("Target '{}' failed: {}", failure.target, failure.message));
  if let Some(output) = &failure.output {
    for line in output.lines() {
      eprintln!("    {}", line.if_supports_color(Stream::Stderr, |s| s.dimmed()));
    }
  }
}

/// Label and value of each summary stat. `Failed` only shows up when
/// something failed.
fn build_stats(report: &BuildReport, targets: usize) -> Vec<(&'static str, usize)> {
  let mut stats = vec![
    ("Targets", targets),
    ("Ran", report.ran.len()),
    ("Up to date", report.up_to_date.len()),
  ];
  if !report.failed.is_empty() {
    stats.push(("Failed", report.failed.len()));
  }
  stats
}

/// Print the outcome of a real (non-recon) build over `targets` targets.
pub fn print_build_summary(report: &BuildReport, targets: usize, elapsed: Duration) {
  for failure in &report.failed {
    print_failure(failure);
  }

  if report.ran.is_empty() && report.is_success() {
    print_success(UP_TO_DATE);
    return;
  }

  if report.is_success() {
    print_success(&format!("Build complete in {}", format_duration(elapsed)));
  } else {
    print_info(&format!("Build stopped after {}", format_duration(elapsed)));
  }
  for (label, value) in build_stats(report, targets) {
    println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
  }
}
