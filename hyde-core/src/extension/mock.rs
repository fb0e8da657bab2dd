//! In-memory extension provider.
//!
//! Backs the lifecycle tests and the `--demo` mode of the console. Every
//! module and instance it hands out is tracked by a shared [`Probe`], so a
//! caller can check that nothing is left alive after a sequence ends.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    AurHelper, ExtensionProvider, INSTALLER_ENTRY_POINTS, Installer, Module, PATCHER_ENTRY_POINTS,
    Patcher,
};
use crate::error::LoadError;

/// Scripted outcomes for the mock extensions
#[derive(Clone, Debug)]
pub struct MockBehavior {
    /// Module file names `open` reports as not found
    pub absent_modules: Vec<String>,
    /// Entry points every mock module fails to export
    pub missing_entry_points: Vec<String>,
    pub initialize: bool,
    pub update_mirrorlist: bool,
    pub aur_available: bool,
    pub install_aur_helper: bool,
    pub run_installation: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            absent_modules: Vec::new(),
            missing_entry_points: Vec::new(),
            initialize: true,
            update_mirrorlist: true,
            aur_available: true,
            install_aur_helper: true,
            run_installation: true,
        }
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    live_modules: usize,
    live_patchers: usize,
    live_installers: usize,
    calls: Vec<String>,
}

/// Shared liveness counters and call journal
#[derive(Clone, Debug, Default)]
pub struct Probe {
    state: Arc<Mutex<ProbeState>>,
}

impl Probe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        // A poisoned probe only means a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: impl Into<String>) {
        self.lock().calls.push(call.into());
    }

    pub fn live_modules(&self) -> usize {
        self.lock().live_modules
    }

    pub fn live_patchers(&self) -> usize {
        self.lock().live_patchers
    }

    pub fn live_installers(&self) -> usize {
        self.lock().live_installers
    }

    /// Nothing loaded and no instance alive
    pub fn is_clean(&self) -> bool {
        let s = self.lock();
        s.live_modules == 0 && s.live_patchers == 0 && s.live_installers == 0
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.lock().calls.iter().any(|c| c == call)
    }
}

pub struct MockProvider {
    behavior: MockBehavior,
    probe: Probe,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            probe: Probe::default(),
        }
    }

    /// Everything succeeds and an AUR helper must be installed first
    pub fn demo() -> Self {
        Self::new(MockBehavior {
            aur_available: false,
            ..Default::default()
        })
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }
}

impl ExtensionProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Module>, LoadError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if self.behavior.absent_modules.contains(&name) {
            return Err(LoadError::NotFound { module: name });
        }

        self.probe.lock().live_modules += 1;
        self.probe.record(format!("open {}", name));
        Ok(Box::new(MockModule {
            name,
            behavior: self.behavior.clone(),
            probe: self.probe.clone(),
        }))
    }
}

struct MockModule {
    name: String,
    behavior: MockBehavior,
    probe: Probe,
}

impl Module for MockModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_entry_point(&self, name: &str) -> bool {
        let exported = PATCHER_ENTRY_POINTS.contains(&name) || INSTALLER_ENTRY_POINTS.contains(&name);
        exported && !self.behavior.missing_entry_points.iter().any(|m| m == name)
    }

    fn create_patcher(&self) -> Option<Box<dyn Patcher>> {
        self.probe.lock().live_patchers += 1;
        self.probe.record("create_patcher");
        Some(Box::new(MockPatcher {
            behavior: self.behavior.clone(),
            probe: self.probe.clone(),
            initialized: false,
            logs: Vec::new(),
        }))
    }

    fn create_installer(&self) -> Option<Box<dyn Installer>> {
        self.probe.lock().live_installers += 1;
        self.probe.record("create_installer");
        Some(Box::new(MockInstaller {
            behavior: self.behavior.clone(),
            probe: self.probe.clone(),
            logs: Vec::new(),
        }))
    }
}

impl Drop for MockModule {
    fn drop(&mut self) {
        let mut s = self.probe.lock();
        s.live_modules = s.live_modules.saturating_sub(1);
        s.calls.push(format!("unload {}", self.name));
    }
}

struct MockPatcher {
    behavior: MockBehavior,
    probe: Probe,
    initialized: bool,
    logs: Vec<String>,
}

impl MockPatcher {
    fn step(&mut self, call: &str, ok: bool, success: &str, failure: &str) -> bool {
        self.probe.record(call);
        let line = if ok { success } else { failure };
        self.logs.push(line.to_string());
        ok
    }
}

#[async_trait]
impl Patcher for MockPatcher {
    async fn initialize(&mut self, _credential: &str) -> bool {
        let ok = self.behavior.initialize;
        self.initialized = ok;
        self.step(
            "initialize_patcher",
            ok,
            "SystemPatcher initialized successfully",
            "Error: Invalid sudo password",
        )
    }

    async fn update_mirrorlist(&mut self) -> bool {
        let ok = self.initialized && self.behavior.update_mirrorlist;
        self.step(
            "update_system_mirrorlist",
            ok,
            "Mirrorlist updated successfully",
            "Failed to update mirrorlist",
        )
    }

    async fn check_aur_available(&mut self) -> bool {
        let ok = self.initialized && self.behavior.aur_available;
        self.step(
            "check_aur_availability",
            ok,
            "AUR helper detected",
            "No AUR helper detected",
        )
    }

    async fn install_aur_helper(&mut self, helper: AurHelper) -> bool {
        let ok = self.initialized && self.behavior.install_aur_helper;
        self.probe.record("install_aur_helper");
        self.logs.push(if ok {
            format!("{} installed successfully", helper)
        } else {
            format!("Failed to install AUR helper: {}", helper)
        });
        ok
    }

    fn logs(&self) -> String {
        self.probe.record("get_patcher_logs");
        self.logs.iter().map(|l| format!("{}\n", l)).collect()
    }
}

impl Drop for MockPatcher {
    fn drop(&mut self) {
        let mut s = self.probe.lock();
        s.live_patchers = s.live_patchers.saturating_sub(1);
        s.calls.push("destroy_patcher".into());
    }
}

struct MockInstaller {
    behavior: MockBehavior,
    probe: Probe,
    logs: Vec<String>,
}

#[async_trait]
impl Installer for MockInstaller {
    async fn run_installation(&mut self) -> bool {
        self.probe.record("run_installation");
        self.logs.push("Starting package installation...".into());
        if self.behavior.run_installation {
            self.logs.push("All packages installed successfully!".into());
            true
        } else {
            self.logs.push("Failed to install pacman packages".into());
            false
        }
    }

    fn logs(&self) -> String {
        self.probe.record("get_installer_logs");
        self.logs.iter().map(|l| format!("{}\n", l)).collect()
    }
}

impl Drop for MockInstaller {
    fn drop(&mut self) {
        let mut s = self.probe.lock();
        s.live_installers = s.live_installers.saturating_sub(1);
        s.calls.push("destroy_installer".into());
    }
}
