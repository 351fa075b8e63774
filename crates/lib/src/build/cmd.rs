//! Isolated command execution.
//!
//! Every subprocess a build starts (shell sources, build protocol steps,
//! post-install and cleanup commands) goes through [`CommandRunner`]:
//! - the inherited environment is cleared and replaced by the module's [`BuildContext`] env
//! - the child is placed in its own process group and killed if the run is dropped
//! - the optional [`Sandbox`] launcher wraps the invocation
//!
//! A non-zero exit is reported with the exit code and the captured stderr.

use std::path::Path;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::context::BuildContext;
use super::sandbox::Sandbox;

/// Longest output tail kept on a failure.
const OUTPUT_TAIL: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum CmdError {
  #[error("failed to start '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command '{cmd}' exited with {}", code.map(|c| c.to_string()).unwrap_or_else(|| "a signal".to_string()))]
  Failed {
    cmd: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },
}

impl CmdError {
  pub fn stderr(&self) -> Option<&str> {
    match self {
      Self::Failed { stderr, .. } => Some(stderr),
      Self::Spawn { .. } => None,
    }
  }

  /// Captured stderr, or stdout when the tool reported on stdout only.
  pub fn diagnostics(&self) -> String {
    match self {
      Self::Failed { stdout, stderr, .. } if stderr.is_empty() => stdout.clone(),
      Self::Failed { stderr, .. } => stderr.clone(),
      Self::Spawn { source, .. } => source.to_string(),
    }
  }
}

/// A single command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
  /// A command line interpreted by the shell.
  Shell(String),
  /// A program and its arguments, run without a shell.
  Argv(Vec<String>),
}

impl Invocation {
  pub fn argv<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::Argv(args.into_iter().map(Into::into).collect())
  }

  /// Printable form, used in logs and errors.
  pub fn display(&self) -> String {
    match self {
      Self::Shell(cmd) => cmd.clone(),
      Self::Argv(args) => args.join(" "),
    }
  }
}

/// Runs invocations inside a module's build context.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
  sandbox: Sandbox,
  shell: Option<String>,
}

impl CommandRunner {
  pub fn new(sandbox: Sandbox) -> Self {
    Self { sandbox, shell: None }
  }

  /// Use a specific shell instead of `/bin/sh`.
  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  pub fn sandbox(&self) -> Sandbox {
    self.sandbox
  }

  /// Run an invocation in `cwd` and return its trimmed stdout.
  pub async fn run(&self, ctx: &BuildContext, cwd: &Path, invocation: &Invocation) -> Result<String, CmdError> {
    let rendered = invocation.display();
    info!(module = %ctx.module(), cmd = %rendered, "running command");

    let (program, args) = match invocation {
      Invocation::Shell(cmd) => {
        let (shell, mut args) = get_shell(self.shell.as_deref());
        args.push(cmd.clone());
        (shell, args)
      }
      Invocation::Argv(argv) => match argv.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => {
          return Err(CmdError::Spawn {
            cmd: rendered,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
          });
        }
      },
    };
    let (program, args) = self.sandbox.wrap(&program, &args, ctx, cwd);

    let mut command = Command::new(&program);
    command
      .args(&args)
      .current_dir(cwd)
      .env_clear()
      .envs(ctx.env())
      .stdin(std::process::Stdio::null())
      .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    debug!(program = %program, cwd = %cwd.display(), sandbox = %self.sandbox, "spawning process");

    let output = command.output().await.map_err(|source| CmdError::Spawn {
      cmd: rendered.clone(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "command stdout");
      }
      return Err(CmdError::Failed {
        cmd: rendered,
        code: output.status.code(),
        stdout: tail(&stdout, OUTPUT_TAIL).to_string(),
        stderr: tail(stderr.trim(), OUTPUT_TAIL).to_string(),
      });
    }

    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command output");
    }
    Ok(stdout)
  }
}

/// The shell used for [`Invocation::Shell`].
///
/// `/bin/sh` unless overridden; `$SHELL` is never consulted since login
/// shells may source profiles that leak host state into the build.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  match override_shell {
    Some(shell) => (shell.to_string(), vec!["-c".to_string()]),
    None => ("/bin/sh".to_string(), vec!["-c".to_string()]),
  }
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
  if s.len() <= max {
    return s;
  }
  let mut start = s.len() - max;
  while !s.is_char_boundary(start) {
    start += 1;
  }
  &s[start..]
}
