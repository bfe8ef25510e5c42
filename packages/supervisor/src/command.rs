// ABOUTME: Bounded execution of external commands (native CLI, docker, compose)
// ABOUTME: Captures stdout/stderr and converts failures into BackendError values

use crate::error::{BackendError, BackendResult};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Most useful error text: stderr, then stdout, then the exit code
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Render a command line for logs and error messages
pub fn describe(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command to completion, killing it if it exceeds `timeout`.
///
/// A nonzero exit is not an error here; callers decide via [`CommandOutput::success`].
pub async fn run_command(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
) -> BackendResult<CommandOutput> {
    let rendered = describe(program, args);
    debug!("Running command: {}", rendered);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BackendError::Unavailable(format!("{} not found: {}", program, e))
        } else {
            BackendError::Spawn {
                command: rendered.clone(),
                error: e.to_string(),
            }
        }
    })?;

    // Dropping the wait future on timeout drops the child, which kills it
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }),
        Ok(Err(e)) => Err(BackendError::Spawn {
            command: rendered,
            error: e.to_string(),
        }),
        Err(_) => Err(BackendError::Timeout {
            command: rendered,
            seconds: timeout.as_secs(),
        }),
    }
}

/// Run a command and require a zero exit status
pub async fn run_checked(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
) -> BackendResult<CommandOutput> {
    let output = run_command(program, args, cwd, timeout).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(BackendError::CommandFailed {
            command: describe(program, args),
            code: output.code,
            stderr: output.error_text(),
        })
    }
}

/// Convenience for building owned argument vectors
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let output = run_command(
            "sh",
            &args(["-c", "echo out; echo err 1>&2"]),
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_checked_reports_stderr() {
        let result = run_checked(
            "sh",
            &args(["-c", "echo 'image build failed' 1>&2; exit 3"]),
            None,
            Duration::from_secs(5),
        )
        .await;

        match result {
            Err(BackendError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "image build failed");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_command_times_out() {
        let result = run_command(
            "sh",
            &args(["-c", "sleep 5"]),
            None,
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(BackendError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let result = run_command(
            "definitely-not-a-real-binary-4d2f",
            &[],
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }

    #[test]
    fn test_error_text_fallbacks() {
        let output = CommandOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "  ".to_string(),
        };
        assert_eq!(output.error_text(), "exited with code 2");
    }
}
