// src/exec.rs

//! External command execution
//!
//! Location handlers shell out to `git`, `svn`/`fcm` and `rsync`. Both the
//! synchronous probe form and the asynchronous pull form capture stdout and
//! stderr; the `run_ok` variants turn a non-zero exit into a
//! [`SubprocessError`] carrying the full command line and both streams.

use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tracing::debug;

use crate::error::Result;

/// An external command exited non-zero or could not be spawned
#[derive(Debug, Error)]
pub struct SubprocessError {
    pub command: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl std::fmt::Display for SubprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "command failed: {}: exit {}", self.command, code)?,
            None => write!(f, "command failed: {}: killed by signal", self.command)?,
        }
        if !self.stderr.is_empty() {
            write!(f, "\n{}", self.stderr)?;
        }
        Ok(())
    }
}

/// Captured outcome of a command: exit code, stdout, stderr
pub type Capture = (i32, String, String);

/// Base options for every rsync invocation
pub const RSYNC_ARGS: &[&str] = &["-a", "--exclude=.*", "--timeout=1800"];

/// Command runner, constructed once per top-level operation
#[derive(Debug, Default, Clone)]
pub struct Runner;

impl Runner {
    pub fn new() -> Self {
        Self
    }

    /// Locate a program on PATH
    pub fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    /// Run a command, capturing output; a non-zero exit is not an error
    ///
    /// A command killed by a signal reports exit code -1.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<Capture> {
        debug!("run: {}", render(program, args));
        let output = std::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    /// Run a command; non-zero exit raises a [`SubprocessError`]
    pub fn run_ok(&self, program: &str, args: &[&str]) -> Result<(String, String)> {
        let (code, stdout, stderr) = self.run(program, args)?;
        if code != 0 {
            return Err(SubprocessError {
                command: render(program, args),
                code: Some(code),
                stdout,
                stderr,
            }
            .into());
        }
        Ok((stdout, stderr))
    }

    /// Asynchronous form of [`Runner::run_ok`]
    pub async fn run_ok_async(&self, program: &str, args: &[&str]) -> Result<(String, String)> {
        debug!("run: {}", render(program, args));
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(SubprocessError {
                command: render(program, args),
                code: output.status.code(),
                stdout,
                stderr,
            }
            .into());
        }
        Ok((stdout, stderr))
    }
}

fn render(program: &str, args: &[&str]) -> String {
    let mut command = program.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}
