//! External command execution for shell-driven backends.

use fstx_core::{BackendError, BackendResult, Context};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// Runs one external program, optionally as another user.
///
/// Each run races the child process against the caller's [`Context`]; if
/// the context finishes first the child is killed and the context error is
/// returned.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
    sudo_user: Option<String>,
}

impl CommandRunner {
    /// Creates a runner for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            sudo_user: None,
        }
    }

    /// Runs the program through `sudo -u <user>`.
    pub fn with_sudo_user(mut self, user: Option<String>) -> Self {
        self.sudo_user = user.filter(|u| !u.is_empty());
        self
    }

    /// The program this runner invokes.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Renders the full command line, for logs and errors.
    pub fn command_line(&self, args: &[&str]) -> String {
        let mut parts = Vec::with_capacity(args.len() + 4);
        if let Some(user) = &self.sudo_user {
            parts.extend(["sudo".to_string(), "-u".to_string(), user.clone()]);
        }
        parts.push(self.program.display().to_string());
        parts.extend(args.iter().map(|a| a.to_string()));
        parts.join(" ")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = match &self.sudo_user {
            Some(user) => {
                let mut cmd = Command::new("sudo");
                cmd.arg("-u").arg(user).arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        };
        cmd.args(args.iter().map(OsStr::new))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs the program with `args`.
    ///
    /// Every stdout line is logged at info level and every stderr line at
    /// error level. A non-zero exit becomes [`BackendError::Command`].
    pub async fn run(&self, ctx: &Context, args: &[&str]) -> BackendResult<CommandOutput> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let line = self.command_line(args);
        let mut cmd = self.command(args);
        debug!(command = %line, "running command");

        let output = tokio::select! {
            biased;
            err = ctx.done() => {
                warn!(command = %line, error = %err, "command interrupted");
                return Err(err.into());
            }
            output = cmd.output() => output?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for l in stdout.lines() {
            info!(command = %line, "{l}");
        }
        for l in stderr.lines() {
            error!(command = %line, "{l}");
        }

        if !output.status.success() {
            return Err(BackendError::Command {
                command: line,
                status: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}
