//! CommandRunner trait and ProcessRunner (sync subprocess wrapper).
//! Backends only talk to the outside world through this seam, so tests
//! inject scripted runners instead of spawning tmux or zellij.

use crate::error::MuxError;
use std::process::{Command, Stdio};

pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning stdout on a zero exit.
    fn run(&self, program: &str, args: &[&str]) -> Result<String, MuxError>;

    /// Run `program` attached to the caller's terminal.
    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<(), MuxError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, MuxError> {
        (**self).run(program, args)
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<(), MuxError> {
        (**self).run_interactive(program, args)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, MuxError> {
        (**self).run(program, args)
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<(), MuxError> {
        (**self).run_interactive(program, args)
    }
}

/// Real runner using `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

fn spawn_error(program: &str, e: std::io::Error) -> MuxError {
    if e.kind() == std::io::ErrorKind::NotFound {
        MuxError::NotFound(program.to_string())
    } else {
        MuxError::Io(e)
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, MuxError> {
        tracing::debug!(program, ?args, "exec");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(program, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MuxError::CommandFailed {
                program: program.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<(), MuxError> {
        tracing::debug!(program, ?args, "exec interactive");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| spawn_error(program, e))?;
        if status.success() {
            Ok(())
        } else {
            Err(MuxError::CommandFailed {
                program: program.to_string(),
                code: status.code().unwrap_or(-1),
                stderr: String::new(),
            })
        }
    }
}
