mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// sake - a self-documenting build tool driven by content hashes
#[derive(Parser)]
#[command(name = "sake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the Sakefile (default: Sakefile, Sakefile.yaml or Sakefile.yml in the current directory)
  #[arg(short, long, global = true)]
  file: Option<PathBuf>,

  /// Log every build decision
  #[arg(short, long, global = true, conflicts_with = "quiet")]
  verbose: bool,

  /// Hide formula output unless a formula fails
  #[arg(short, long, global = true)]
  quiet: bool,

  /// Define or override a macro (NAME=VALUE, repeatable)
  #[arg(short = 'D', long = "define", global = true, value_name = "NAME=VALUE", value_parser = parse_define)]
  defines: Vec<(String, String)>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build all default targets, or the named targets and what they depend on
  Build(BuildArgs),

  /// Check the Sakefile's structure without building anything
  Audit,
}

#[derive(Args)]
struct BuildArgs {
  /// Targets or meta-targets to build
  targets: Vec<String>,

  /// Run every selected target, even if it is up to date
  #[arg(short = 'F', long)]
  force: bool,

  /// Show what would run without running it
  #[arg(short, long)]
  recon: bool,

  /// Run independent targets concurrently
  #[arg(short, long)]
  parallel: bool,

  /// Shell to run formulas with (default: /bin/sh, or powershell on Windows)
  #[arg(long)]
  shell: Option<String>,
}

fn parse_define(s: &str) -> Result<(String, String)> {
  let Some((name, value)) = s.split_once('=') else {
    bail!("expected NAME=VALUE, got '{}'", s);
  };
  let name = name.trim();
  if name.is_empty() {
    bail!("macro name is empty in '{}'", s);
  }
  Ok((name.to_string(), value.to_string()))
}

fn init_tracing(verbose: bool, quiet: bool) {
  let default_filter = if verbose {
    "warn,sake_lib=debug,sake_cli=debug"
  } else if quiet {
    "warn"
  } else {
    "warn,sake_lib=info"
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .with_target(false)
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose, cli.quiet);

  let project = cmd::Project {
    file: cli.file,
    defines: cli.defines.into_iter().collect(),
  };

  let result = match cli.command {
    Commands::Build(args) => cmd::cmd_build(
      &project,
      &args.targets,
      cmd::BuildFlags {
        force: args.force,
        recon: args.recon,
        parallel: args.parallel,
        quiet: cli.quiet,
        shell: args.shell,
      },
      cli.output,
    ),
    Commands::Audit => cmd::cmd_audit(&project, cli.output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn define_splits_on_first_equals() {
    assert_eq!(
      parse_define("CFLAGS=-O2 -DX=1").unwrap(),
      ("CFLAGS".to_string(), "-O2 -DX=1".to_string())
    );
    assert_eq!(parse_define("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
  }

  #[test]
  fn define_requires_name_and_equals() {
    assert!(parse_define("NOVALUE").is_err());
    assert!(parse_define("=value").is_err());
  }

  #[test]
  fn cli_definition_is_consistent() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
  }
}
