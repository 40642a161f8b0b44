//! Command-execution boundary for the shell backend.
//!
//! The shell backend only needs "run a command, capture exit code, stdout
//! and stderr". The embedding environment supplies the transport (an SSH
//! channel, a container exec, a sandbox); [`LocalCommandRunner`] runs
//! commands on the local machine and backs the tests and the CLI.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{FsError, FsResult};

/// Captured result of one command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; `None` when the process died to a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Abstract process-execution service. Implementations block until the
/// command completes; commands are expected to run to completion without a
/// timeout, and callers needing cancellation must kill the underlying
/// process out-of-band.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>)
        -> FsResult<CommandOutput>;
}

/// Runs commands as local subprocesses via `std::process`.
#[derive(Debug, Default)]
pub struct LocalCommandRunner;

impl LocalCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for LocalCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> FsResult<CommandOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|err| {
            FsError::command_failed(program, None, format!("failed to spawn: {err}"))
        })?;

        if let Some(data) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(data).map_err(|err| {
                    FsError::command_failed(program, None, format!("failed to write stdin: {err}"))
                })?;
            }
        }

        let output = child.wait_with_output().map_err(|err| {
            FsError::command_failed(program, None, format!("failed to collect output: {err}"))
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
