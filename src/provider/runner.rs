// Subprocess invocation behind a mockable trait

use crate::error::{Result, SvcdeckError};
use futures::future::BoxFuture;
use tokio::process::Command;

/// Captured output of one finished subprocess
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Runs external service-manager tools.
///
/// Providers depend on this trait rather than `tokio::process` directly so
/// parser and control logic can be exercised against canned output in tests.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run a program to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; providers decide what failure
    /// text means. Only spawn problems (binary missing, EACCES) error out.
    fn run(&self, program: String, args: Vec<String>) -> BoxFuture<'static, Result<CmdOutput>>;
}

/// Production runner spawning real subprocesses
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: String, args: Vec<String>) -> BoxFuture<'static, Result<CmdOutput>> {
        Box::pin(async move {
            tracing::debug!("spawning {} {}", program, args.join(" "));

            let output = Command::new(&program)
                .args(&args)
                .kill_on_drop(false)
                .output()
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        SvcdeckError::ManagerUnavailable(program.clone())
                    }
                    std::io::ErrorKind::PermissionDenied => {
                        SvcdeckError::Permission(format!("cannot execute {}: EACCES", program))
                    }
                    _ => SvcdeckError::Io(e),
                })?;

            Ok(CmdOutput {
                status_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

#[cfg(test)]
pub(crate) fn ok_output(stdout: &str) -> CmdOutput {
    CmdOutput {
        status_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

#[cfg(test)]
pub(crate) fn failed_output(code: i32, stderr: &str) -> CmdOutput {
    CmdOutput {
        status_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
