use std::path::Path;
use std::process::Command;

use hyde_core::config::HydeConfig;
use hyde_core::extension::{AurHelper, ExtensionHandle, ExtensionProvider, Role};

use crate::extensions::Requirements;

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// External tools the console and the built-in extensions shell out to,
/// with the package that provides each.
const TOOLS: [(&str, &str); 6] = [
    ("sudo", "sudo"),
    ("pacman", "pacman"),
    ("reflector", "reflector"),
    ("git", "git"),
    ("makepkg", "pacman"),
    ("fastfetch", "fastfetch"),
];

/// Print the environment report. Returns whether every check passed.
pub fn run_doctor(
    config_path: Option<&Path>,
    config: &HydeConfig,
    provider: &dyn ExtensionProvider,
) -> bool {
    println!("HyDE TUI Doctor\n");
    println!("Checking environment...\n");

    let mut checks: Vec<Check> = Vec::new();

    println!("Tools:");
    let mut tools: Vec<Check> = TOOLS
        .iter()
        .map(|(tool, package)| check_tool(tool, package))
        .collect();
    tools.push(check_aur_helper());
    for check in &tools {
        print_check(check);
    }
    checks.extend(tools);
    println!();

    match config_path {
        Some(path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: not found, using defaults"),
    }
    println!();

    println!("Extensions ({}):", provider.name());
    let extensions = check_extensions(provider, config);
    for check in &extensions {
        print_check(check);
    }
    checks.extend(extensions);
    println!();

    println!("Requirements:");
    let requirements = check_requirements(&config.requirements);
    print_check(&requirements);
    checks.push(requirements);
    println!();

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
    if failed.is_empty() {
        println!("All checks passed!");
    } else {
        println!("Issues found:");
        for check in &failed {
            println!("  - {}: {}", check.name, check.message);
            if let Some(hint) = &check.hint {
                println!("    Hint: {}", hint);
            }
        }
    }

    failed.is_empty()
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!(
        "  {}{}{} {}: {}",
        color, icon, reset, check.name, check.message
    );

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

fn tool_version(tool: &str) -> Option<String> {
    // Only care that the program exists; some tools exit non-zero on --version
    let output = Command::new(tool).arg("--version").output().ok()?;
    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("installed")
        .to_string();
    Some(version)
}

fn check_tool(tool: &str, package: &str) -> Check {
    match tool_version(tool) {
        Some(version) => Check::ok(tool, version),
        None => Check::fail(tool, "not found")
            .with_hint(format!("Install with: sudo pacman -S {}", package)),
    }
}

fn check_aur_helper() -> Check {
    AurHelper::ALL
        .iter()
        .find(|helper| tool_version(helper.as_str()).is_some())
        .map(|helper| Check::ok("aur helper", helper.as_str()))
        .unwrap_or_else(|| {
            Check::fail("aur helper", "neither yay nor paru found")
                .with_hint("Fresh Install will offer to build one")
        })
}

fn check_extensions(provider: &dyn ExtensionProvider, config: &HydeConfig) -> Vec<Check> {
    [
        (Role::Patcher, config.patcher_module()),
        (Role::Installer, config.installer_module()),
    ]
    .into_iter()
    .map(|(role, path)| match ExtensionHandle::load(provider, &path, role) {
        Ok(handle) => Check::ok(role.to_string(), handle.name().to_string()),
        Err(e) => Check::fail(role.to_string(), e.to_string())
            .with_hint(format!("Expected module at {}", path.display())),
    })
    .collect()
}

fn check_requirements(path: &Path) -> Check {
    match Requirements::load(path) {
        Ok(r) => Check::ok("manifest", format!("{} packages in {}", r.packages.len(), path.display())),
        Err(e) => Check::fail("manifest", e)
            .with_hint("Fresh Install reads its package list from this file"),
    }
}
