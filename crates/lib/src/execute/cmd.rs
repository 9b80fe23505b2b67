//! Formula execution.
//!
//! A target's formula is handed to a single shell invocation, so pipes, `&&`
//! and multi-line scripts behave exactly as they would interactively.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CmdError {
  #[error("failed to start {shell}: {source}")]
  Spawn {
    shell: String,
    #[source]
    source: std::io::Error,
  },

  #[error("formula exited with {}", exit_description(.code))]
  Failed {
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },
}

fn exit_description(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("status {code}"),
    None => "no status (terminated by signal)".to_string(),
  }
}

/// Run `formula` in `cwd`.
///
/// With `quiet`, stdout and stderr are captured and returned only inside a
/// failure; otherwise they go straight to the terminal.
pub async fn run_commands(formula: &str, cwd: &Path, quiet: bool, shell: Option<&str>) -> Result<(), CmdError> {
  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command.args(&shell_args).arg(formula).current_dir(cwd).stdin(Stdio::null());

  debug!(shell = %shell_cmd, cwd = %cwd.display(), formula, "spawning formula");

  let spawn_err = |source| CmdError::Spawn {
    shell: shell_cmd.clone(),
    source,
  };

  if quiet {
    let output = command.output().await.map_err(spawn_err)?;
    if !output.status.success() {
      return Err(CmdError::Failed {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      });
    }
  } else {
    let status = command.status().await.map_err(spawn_err)?;
    if !status.success() {
      return Err(CmdError::Failed {
        code: status.code(),
        stdout: String::new(),
        stderr: String::new(),
      });
    }
  }

  Ok(())
}

/// Get the shell command and arguments for the current platform.
///
/// An explicit `override_shell` gets the flag matching its family: `-c` for
/// Unix shells, `/C` for cmd, `-Command` for PowerShell.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
