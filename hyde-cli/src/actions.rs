//! Named-script execution for menu entries and `hyde-tui run`.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;

use hyde_core::command::{CommandResult, CommandSpec, shell_quote};

use crate::runner::CommandRunner;

pub const SEPARATOR: &str = "----------------------------------------";

const OWNER_EXECUTE: u32 = 0o100;

/// Run the script at `path`, sending every log line (framing included) to
/// `lines` in order. Returns `None` when the script never started.
pub async fn run_script(
    runner: &CommandRunner,
    path: &Path,
    timeout: Duration,
    lines: &mpsc::UnboundedSender<String>,
) -> Option<CommandResult> {
    let shown = path.display();
    let log = |line: String| {
        let _ = lines.send(line);
    };

    log(format!("Attempting to execute: {}", shown));

    if !path.is_file() {
        log(format!("Error: Script not found: {}", shown));
        return None;
    }

    if let Err(e) = grant_owner_execute(path) {
        tracing::warn!(path = %path.display(), error = %e, "chmod failed");
        log(format!("Error: Failed to execute {}: {}", shown, e));
        return None;
    }

    log(format!("Executing: {}", shown));
    log(SEPARATOR.to_string());

    let spec = CommandSpec::new(shell_quote(&path.to_string_lossy())).with_timeout(timeout);
    let result = runner.run_streaming(&spec, lines).await;

    log(SEPARATOR.to_string());
    if result.success() {
        log("Script completed successfully".to_string());
    } else if result.spawn_failed() {
        log(format!("Error: Failed to execute {}", shown));
    } else if !result.exited_via_timeout() {
        // On timeout the runner has already streamed the notice
        log(format!("Script exited with status: {}", result.status));
    }

    tracing::info!(path = %path.display(), status = result.status, "script finished");
    Some(result)
}

fn grant_owner_execute(path: &Path) -> std::io::Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & OWNER_EXECUTE == 0 {
        permissions.set_mode(mode | OWNER_EXECUTE);
        std::fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    async fn collect(path: &Path, timeout: Duration) -> (Option<CommandResult>, Vec<String>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = run_script(&CommandRunner::new(), path, timeout, &tx).await;
        drop(tx);
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        (result, lines)
    }

    #[tokio::test]
    async fn test_successful_script_is_framed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "update.sh", "echo one\necho two >&2", 0o755);

        let (result, lines) = collect(&path, Duration::from_secs(10)).await;

        assert!(result.unwrap().success());
        let shown = path.display().to_string();
        assert_eq!(
            lines,
            vec![
                format!("Attempting to execute: {}", shown),
                format!("Executing: {}", shown),
                SEPARATOR.to_string(),
                "one".to_string(),
                "two".to_string(),
                SEPARATOR.to_string(),
                "Script completed successfully".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("themepatcher.sh");

        let (result, lines) = collect(&path, Duration::from_secs(10)).await;

        assert!(result.is_none());
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            format!("Error: Script not found: {}", path.display())
        );
    }

    #[tokio::test]
    async fn test_grants_owner_execute_and_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "fail.sh", "echo nope\nexit 3", 0o644);

        let (result, lines) = collect(&path, Duration::from_secs(10)).await;

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_ne!(mode & OWNER_EXECUTE, 0);
        assert_eq!(result.unwrap().status, 3);
        assert_eq!(lines.last().unwrap(), "Script exited with status: 3");
    }

    #[tokio::test]
    async fn test_timeout_notice_closes_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "slow.sh", "sleep 5", 0o755);

        let (result, lines) = collect(&path, Duration::from_secs(1)).await;

        assert!(result.unwrap().exited_via_timeout());
        assert_eq!(lines.last().unwrap(), SEPARATOR);
        assert_eq!(lines[lines.len() - 2], "Command timed out after 1 seconds");
    }
}
