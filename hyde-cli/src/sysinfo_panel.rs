use std::time::Duration;

use sysinfo::System;

use hyde_core::command::CommandSpec;

use crate::runner::CommandRunner;

/// The panel is cosmetic; never wait long for it.
const PANEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Lines for the system-info panel. Uses the configured command when it
/// succeeds, otherwise a summary gathered in-process.
pub async fn panel_lines(runner: &CommandRunner, command: &str, limit: usize) -> Vec<String> {
    let result = runner
        .run(&CommandSpec::shell(command).with_timeout(PANEL_TIMEOUT))
        .await;

    match result.into_result(command) {
        Ok(output) => {
            let lines = non_empty(&output, limit);
            if !lines.is_empty() {
                return lines;
            }
            tracing::debug!(command, "system info command printed nothing, using fallback");
        }
        Err(e) => tracing::debug!(error = %e, "system info command unavailable, using fallback"),
    }
    fallback_lines(limit)
}

fn non_empty(output: &[String], limit: usize) -> Vec<String> {
    output
        .iter()
        .filter(|line| !line.trim().is_empty())
        .take(limit)
        .cloned()
        .collect()
}

fn fallback_lines(limit: usize) -> Vec<String> {
    let mut system = System::new();
    system.refresh_cpu_all();
    system.refresh_memory();

    let unknown = || "unknown".to_string();
    let cpu = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(unknown);

    let lines = vec![
        format!("Host: {}", System::host_name().unwrap_or_else(unknown)),
        format!("OS: {}", System::long_os_version().unwrap_or_else(unknown)),
        format!("Kernel: {}", System::kernel_version().unwrap_or_else(unknown)),
        format!("Uptime: {}", format_uptime(System::uptime())),
        format!("CPU: {} ({} threads)", cpu, system.cpus().len()),
        format!(
            "Memory: {} / {}",
            format_bytes(system.used_memory()),
            format_bytes(system.total_memory())
        ),
    ];
    lines.into_iter().take(limit).collect()
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let mins = (secs % 3600) / 60;
    match (days, hours) {
        (0, 0) => format!("{} mins", mins),
        (0, _) => format!("{} hours, {} mins", hours, mins),
        _ => format!("{} days, {} hours, {} mins", days, hours, mins),
    }
}

fn format_bytes(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.2} GiB", b / GIB)
    } else {
        format!("{:.0} MiB", b / MIB)
    }
}

/// `Welcome, <user>` for the menu panel
pub fn welcome_line() -> String {
    welcome_for(std::env::var("USER").ok())
}

fn welcome_for(user: Option<String>) -> String {
    let user = user
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "User".to_string());
    format!("Welcome, {}", user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panel_keeps_non_empty_lines_up_to_limit() {
        let lines = panel_lines(&CommandRunner::new(), "printf 'a\\n\\nb\\n  \\nc\\nd\\n'", 3).await;
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_command_falls_back() {
        let lines = panel_lines(&CommandRunner::new(), "exit 1", 10).await;
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("Host: "));
        assert!(lines[5].starts_with("Memory: "));

        let lines = panel_lines(&CommandRunner::new(), "true", 2).await;
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "0 mins");
        assert_eq!(format_uptime(3 * 3600 + 120), "3 hours, 2 mins");
        assert_eq!(format_uptime(2 * 86_400 + 3600), "2 days, 1 hours, 0 mins");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512 * 1024 * 1024), "512 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn test_welcome_line() {
        assert_eq!(welcome_for(Some("ada".into())), "Welcome, ada");
        assert_eq!(welcome_for(Some(String::new())), "Welcome, User");
        assert_eq!(welcome_for(None), "Welcome, User");
    }
}
