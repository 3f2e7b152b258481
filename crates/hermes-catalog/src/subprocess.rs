//! Shell command execution with a wall-clock timeout.
//!
//! Mirrors the agent's one subprocess contract: run `command` under a
//! shell, wait up to `timeout` for it to finish, and surface stdout on
//! success. stderr is never fatal by itself; callers log it.

use crate::error::SubprocessError;
use std::time::Duration;
use tokio::process::Command;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Runs `command` in a shell, enforcing `timeout`.
///
/// Returns `(stdout, stderr)` on a zero exit status. A non-zero exit,
/// spawn failure, or timeout is reported as a [`SubprocessError`]; stderr
/// output on an otherwise-successful run is returned alongside stdout so
/// the caller can log it.
pub async fn run_shell(command: &str, timeout: Duration) -> Result<(String, String), SubprocessError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|source| SubprocessError::Spawn {
            command: command.to_string(),
            source,
        })?;

    #[cfg(feature = "tracing")]
    debug!(command, pid = child.id(), "started subprocess");

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(SubprocessError::Spawn {
                command: command.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(SubprocessError::Timeout {
                command: command.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !stderr.is_empty() {
        #[cfg(feature = "tracing")]
        warn!(command, %stderr, "subprocess wrote to stderr");
    }

    if !output.status.success() {
        return Err(SubprocessError::NonZeroExit {
            command: command.to_string(),
            status: output.status.to_string(),
        });
    }

    Ok((stdout, stderr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let (stdout, _) = run_shell("echo hello", Duration::from_secs(5)).await.unwrap();
        assert_eq!(stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let err = run_shell("exit 3", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, SubprocessError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let err = run_shell("sleep 5", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SubprocessError::Timeout { .. }));
    }
}
