use std::{
  path::{Path, PathBuf},
  process::Stdio,
  sync::OnceLock,
  time::Duration,
};

mod output;

pub use output::*;
use tokio::process::Command;

/// Result of one external-tool invocation, sanitized of any interpolated
/// secrets before it is persisted into a compose's `state_reason` or log
/// files.
#[derive(Debug, Clone)]
pub struct ToolRunLog {
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
  pub timed_out: bool,
  pub start_ts: i64,
  pub end_ts: i64,
}

/// Run `command` directly (no shell), with a hard wall-clock timeout. On
/// timeout the child (and its stdio pipes) are dropped, which — combined
/// with `kill_on_drop(true)` — sends it SIGKILL; this is the "watchdog
/// kills the process tree at timeout" behavior described for the Worker's
/// tool invocation.
pub async fn run_tool_command(
  command: &str,
  path: impl Into<Option<&Path>>,
  timeout: Duration,
) -> ToolRunLog {
  let start_ts = unix_timestamp_ms();
  let output = run_with_timeout(command, path, timeout).await;
  let timed_out = output.stderr == "tool execution timed out";
  ToolRunLog {
    command: command.to_string(),
    stdout: output.stdout,
    stderr: output.stderr,
    success: output.success() && !timed_out,
    timed_out,
    start_ts,
    end_ts: unix_timestamp_ms(),
  }
}

/// Sanitizes command/stdout/stderr for any configured secret values before
/// they are persisted, using the same key=value replacer convention the
/// rest of this stack uses for redacting credentials from logs.
pub fn sanitize_log(
  mut log: ToolRunLog,
  replacers: &[(String, String)],
) -> ToolRunLog {
  log.command = svi::replace_in_string(&log.command, replacers);
  log.stdout = svi::replace_in_string(&log.stdout, replacers);
  log.stderr = svi::replace_in_string(&log.stderr, replacers);
  log
}

async fn run_with_timeout(
  command: &str,
  path: impl Into<Option<&Path>>,
  timeout: Duration,
) -> CommandOutput {
  let lexed = if let Some(lexed) = shlex::split(command)
    && !lexed.is_empty()
  {
    lexed
  } else {
    return CommandOutput::from_err(
      std::io::Error::other("command lexed into empty args"),
      None,
    );
  };

  let mut cmd = Command::new(&lexed[0]);
  cmd
    .args(&lexed[1..])
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if let Some(path) = path.into() {
    match path.canonicalize() {
      Ok(path) => {
        cmd.current_dir(path);
      }
      Err(e) => return CommandOutput::from_err(e, None),
    }
  }

  let mut child = match cmd.spawn() {
    Ok(child) => child,
    Err(e) => return CommandOutput::from_err(e, None),
  };
  let pid = child.id();

  match tokio::time::timeout(timeout, child.wait_with_output()).await
  {
    Ok(output) => CommandOutput::from(output, pid),
    Err(_) => CommandOutput::timed_out(pid),
  }
}

/// Commands are run directly, and cannot include '&&'. Used for git and
/// other auxiliary subprocesses that don't need a timeout.
pub async fn run_standard_command(
  command: &str,
  path: impl Into<Option<&Path>>,
) -> CommandOutput {
  run_with_timeout(command, path, Duration::from_secs(3600)).await
}

fn shell() -> &'static str {
  static DEFAULT_SHELL: OnceLock<String> = OnceLock::new();
  DEFAULT_SHELL.get_or_init(|| {
    if PathBuf::from("/bin/bash").exists()
      || PathBuf::from("/usr/bin/bash").exists()
    {
      String::from("bash")
    } else {
      String::from("sh")
    }
  })
}

/// Commands are wrapped in 'sh -c', and can include '&&'.
pub async fn run_shell_command(
  command: &str,
  path: impl Into<Option<&Path>>,
  timeout: Duration,
) -> CommandOutput {
  let mut cmd = Command::new(shell());
  cmd.args(["-c", command]).kill_on_drop(true).stdin(Stdio::null());
  if let Some(path) = path.into() {
    match path.canonicalize() {
      Ok(path) => {
        cmd.current_dir(path);
      }
      Err(e) => return CommandOutput::from_err(e, None),
    }
  }
  cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
  let mut child = match cmd.spawn() {
    Ok(child) => child,
    Err(e) => return CommandOutput::from_err(e, None),
  };
  let pid = child.id();
  match tokio::time::timeout(timeout, child.wait_with_output()).await
  {
    Ok(output) => CommandOutput::from(output, pid),
    Err(_) => CommandOutput::timed_out(pid),
  }
}

fn unix_timestamp_ms() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or_default()
}
