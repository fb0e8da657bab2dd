//! Diagnostic logging setup.
//!
//! The interactive console owns the terminal, so in that mode the log goes
//! to a file instead of stderr.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable that overrides `-v`/`-q`
pub const LOG_ENV: &str = "HYDE_LOG";

pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

/// Initialize tracing with appropriate verbosity
pub fn init_tracing(verbose: u8, quiet: bool, target: LogTarget) -> Result<()> {
    let directive = filter_directive(std::env::var(LOG_ENV).ok(), verbose, quiet);
    let filter = EnvFilter::try_new(&directive)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    match target {
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()
            .context("failed to install tracing subscriber")?,
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .with(filter)
                .try_init()
                .context("failed to install tracing subscriber")?
        }
    }

    Ok(())
}

fn filter_directive(env: Option<String>, verbose: u8, quiet: bool) -> String {
    if let Some(env) = env.filter(|e| !e.trim().is_empty()) {
        return env;
    }
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(filter_directive(None, 0, false), "info");
        assert_eq!(filter_directive(None, 1, false), "debug");
        assert_eq!(filter_directive(None, 5, false), "trace");
        assert_eq!(filter_directive(None, 2, true), "error");
        assert_eq!(filter_directive(Some("hyde_core=trace".into()), 0, true), "hyde_core=trace");
        assert_eq!(filter_directive(Some("  ".into()), 1, false), "debug");
    }
}
