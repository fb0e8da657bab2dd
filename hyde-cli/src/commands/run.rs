use anyhow::Result;
use tokio::sync::mpsc;

use hyde_core::command::SPAWN_FAILURE_EXIT_CODE;
use hyde_core::config::HydeConfig;

use super::print_line;
use crate::actions;
use crate::runner::CommandRunner;

/// Run a named script outside the console. Returns the exit code to end
/// the process with.
pub async fn run_script(config: &HydeConfig, script: &str) -> Result<i32> {
    let path = config.script_path(script);
    let timeout = config.timeouts.default_timeout();
    let runner = CommandRunner::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let run = async move { actions::run_script(&runner, &path, timeout, &tx).await };
    let print = async {
        while let Some(line) = rx.recv().await {
            print_line(&line);
        }
    };
    let (result, ()) = tokio::join!(run, print);

    Ok(match result {
        Some(result) if result.status == SPAWN_FAILURE_EXIT_CODE => 1,
        Some(result) => result.status,
        None => 1,
    })
}
