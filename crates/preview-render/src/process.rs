use std::collections::VecDeque;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::error::{Error, Result};

/// Lines kept from a child's combined stdout+stderr for diagnostics on
/// non-zero exit (spec §9 "Capture stdout+stderr into a rotating log
/// buffer; log on non-zero exit.").
const LOG_BUFFER_LINES: usize = 64;

/// Run `command`, enforcing `timeout`, killing the child and mapping to
/// [`Error::ToolTimedOut`] on elapse. Logs the tail of combined
/// stdout+stderr via `tracing::warn!` on non-zero exit, matching the
/// original's `log.Println(buf.String())` on failure.
pub async fn run_with_timeout(mut command: Command, timeout: Duration, tool: &str) -> Result<()> {
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());
    // On timeout the `wait` future below is dropped without ever reaping the
    // child; kill_on_drop makes that drop send a kill instead of orphaning it.
    command.kill_on_drop(true);

    let mut child = command.spawn().map_err(|_| Error::ToolNotFound(tool.to_string()))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let wait = async move {
        let output = child.wait_with_output().await?;
        Ok::<_, std::io::Error>(output)
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(output)) => {
            drop(stdout);
            drop(stderr);
            if output.status.success() {
                Ok(())
            } else {
                let tail = tail_lines(&output.stdout, &output.stderr);
                warn!(tool, status = ?output.status, log = %tail, "external tool exited with non-zero status");
                Err(Error::ToolFailed(tool.to_string(), output.status.code().unwrap_or(-1)))
            }
        }
        Ok(Err(err)) => Err(Error::Io(err)),
        Err(_) => Err(Error::ToolTimedOut(timeout)),
    }
}

fn tail_lines(stdout: &[u8], stderr: &[u8]) -> String {
    let mut buffer: VecDeque<String> = VecDeque::with_capacity(LOG_BUFFER_LINES);
    for line in String::from_utf8_lossy(stdout).lines().chain(String::from_utf8_lossy(stderr).lines()) {
        if buffer.len() == LOG_BUFFER_LINES {
            buffer.pop_front();
        }
        buffer.push_back(line.to_string());
    }
    buffer.into_iter().collect::<Vec<_>>().join("\n")
}

/// `true` if `tool` is resolvable on `PATH`, mirroring the original's
/// `exec.LookPath` pre-flight check before shelling out.
pub fn tool_on_path(tool: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_ok() {
        let command = Command::new("true");
        let result = run_with_timeout(command, Duration::from_secs(5), "true").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn nonzero_exit_is_tool_failed() {
        let command = Command::new("false");
        let result = run_with_timeout(command, Duration::from_secs(5), "false").await;
        assert!(matches!(result, Err(Error::ToolFailed(_, _))));
    }

    #[tokio::test]
    async fn elapsed_timeout_kills_the_child_instead_of_leaking_it() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let result = run_with_timeout(command, Duration::from_millis(50), "sleep").await;
        assert!(matches!(result, Err(Error::ToolTimedOut(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_tool_not_found() {
        let command = Command::new("definitely-not-a-real-binary-xyz");
        let result = run_with_timeout(command, Duration::from_secs(5), "definitely-not-a-real-binary-xyz").await;
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
    }
}
