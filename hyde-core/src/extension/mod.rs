//! Extension roles and loading.
//!
//! Exactly two roles exist: the system patcher and the system installer.
//! A module is opened through an [`ExtensionProvider`], every entry point the
//! role needs is checked up front, and the module is unloaded when its
//! [`ExtensionHandle`] drops. The rest of the console never sees how a
//! provider finds or opens modules.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::{LifecycleError, LoadError};

pub mod mock;

/// Entry points a patcher module must export
pub const PATCHER_ENTRY_POINTS: [&str; 8] = [
    "create_patcher",
    "destroy_patcher",
    "initialize_patcher",
    "get_patcher_logs",
    "free_patcher_logs",
    "update_system_mirrorlist",
    "check_aur_availability",
    "install_aur_helper",
];

/// Entry points an installer module must export
pub const INSTALLER_ENTRY_POINTS: [&str; 5] = [
    "create_installer",
    "destroy_installer",
    "run_installation",
    "get_installer_logs",
    "free_installer_logs",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Patcher,
    Installer,
}

impl Role {
    pub fn entry_points(&self) -> &'static [&'static str] {
        match self {
            Self::Patcher => &PATCHER_ENTRY_POINTS,
            Self::Installer => &INSTALLER_ENTRY_POINTS,
        }
    }

    fn create_entry_point(&self) -> &'static str {
        self.entry_points()[0]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patcher => write!(f, "patcher"),
            Self::Installer => write!(f, "installer"),
        }
    }
}

/// AUR helpers the patcher knows how to bootstrap
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AurHelper {
    Yay,
    Paru,
}

impl AurHelper {
    pub const ALL: [AurHelper; 2] = [AurHelper::Yay, AurHelper::Paru];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yay => "yay",
            Self::Paru => "paru",
        }
    }
}

impl fmt::Display for AurHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AurHelper {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yay" => Ok(Self::Yay),
            "paru" => Ok(Self::Paru),
            other => Err(LifecycleError::validation(format!(
                "invalid AUR helper '{}' (expected yay or paru)",
                other
            ))),
        }
    }
}

/// A live patcher instance. Dropping it is the `destroy` call.
#[async_trait]
pub trait Patcher: Send {
    /// Store and validate the elevation credential
    async fn initialize(&mut self, credential: &str) -> bool;

    async fn update_mirrorlist(&mut self) -> bool;

    async fn check_aur_available(&mut self) -> bool;

    async fn install_aur_helper(&mut self, helper: AurHelper) -> bool;

    /// All log lines so far, newline separated. The caller owns the string.
    fn logs(&self) -> String;
}

/// A live installer instance. Dropping it is the `destroy` call.
#[async_trait]
pub trait Installer: Send {
    async fn run_installation(&mut self) -> bool;

    /// All log lines so far, newline separated. The caller owns the string.
    fn logs(&self) -> String;
}

/// An opened module. Dropping it unloads the module.
pub trait Module: Send {
    /// Identifier used in log lines (usually the file name)
    fn name(&self) -> &str;

    fn has_entry_point(&self, name: &str) -> bool;

    fn create_patcher(&self) -> Option<Box<dyn Patcher>>;

    fn create_installer(&self) -> Option<Box<dyn Installer>>;
}

/// Locates and opens modules
pub trait ExtensionProvider: Send + Sync {
    /// Human-readable name of this provider
    fn name(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Box<dyn Module>, LoadError>;
}

/// A module whose required entry points were all resolved.
pub struct ExtensionHandle {
    role: Role,
    module: Box<dyn Module>,
}

impl ExtensionHandle {
    /// Open `path` and check every entry point `role` needs. On a missing
    /// entry point the module is unloaded before the error is returned.
    pub fn load(
        provider: &dyn ExtensionProvider,
        path: &Path,
        role: Role,
    ) -> Result<Self, LoadError> {
        let module = provider.open(path)?;

        if let Some(missing) = role
            .entry_points()
            .iter()
            .find(|name| !module.has_entry_point(name))
        {
            let err = LoadError::MissingEntryPoint {
                module: module.name().to_string(),
                entry_point: missing.to_string(),
            };
            drop(module);
            return Err(err);
        }

        tracing::debug!(module = module.name(), %role, provider = provider.name(), "extension loaded");
        Ok(Self { role, module })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn create_patcher(&self) -> Result<Box<dyn Patcher>, LoadError> {
        self.expect_role(Role::Patcher)?;
        self.module
            .create_patcher()
            .ok_or_else(|| self.missing(Role::Patcher))
    }

    pub fn create_installer(&self) -> Result<Box<dyn Installer>, LoadError> {
        self.expect_role(Role::Installer)?;
        self.module
            .create_installer()
            .ok_or_else(|| self.missing(Role::Installer))
    }

    fn expect_role(&self, role: Role) -> Result<(), LoadError> {
        if self.role == role {
            Ok(())
        } else {
            Err(self.missing(role))
        }
    }

    fn missing(&self, role: Role) -> LoadError {
        LoadError::MissingEntryPoint {
            module: self.module.name().to_string(),
            entry_point: role.create_entry_point().to_string(),
        }
    }
}

impl Drop for ExtensionHandle {
    fn drop(&mut self) {
        tracing::debug!(module = self.module.name(), role = %self.role, "extension unloaded");
    }
}

impl fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("role", &self.role)
            .field("module", &self.module.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::mock::{MockBehavior, MockProvider};
    use super::*;

    #[test]
    fn test_aur_helper_closed_set() {
        assert_eq!("yay".parse::<AurHelper>().unwrap(), AurHelper::Yay);
        assert_eq!("paru".parse::<AurHelper>().unwrap(), AurHelper::Paru);
        for bad in ["zsh", "YAY", "", " paru"] {
            assert!(matches!(
                bad.parse::<AurHelper>(),
                Err(LifecycleError::ValidationFailure { .. })
            ));
        }
    }

    #[test]
    fn test_load_resolves_all_entry_points() {
        let provider = MockProvider::new(MockBehavior::default());
        let handle =
            ExtensionHandle::load(&provider, &PathBuf::from("lib/system_patcher.so"), Role::Patcher)
                .unwrap();
        assert_eq!(handle.name(), "system_patcher.so");
        assert_eq!(provider.probe().live_modules(), 1);
        drop(handle);
        assert_eq!(provider.probe().live_modules(), 0);
    }

    #[test]
    fn test_load_not_found() {
        let behavior = MockBehavior {
            absent_modules: vec!["fresh_install.so".into()],
            ..Default::default()
        };
        let provider = MockProvider::new(behavior);
        let err = ExtensionHandle::load(&provider, Path::new("fresh_install.so"), Role::Installer)
            .unwrap_err();
        assert_eq!(
            err,
            LoadError::NotFound {
                module: "fresh_install.so".into()
            }
        );
        assert_eq!(provider.probe().live_modules(), 0);
    }

    #[test]
    fn test_missing_entry_point_unloads_module() {
        let behavior = MockBehavior {
            missing_entry_points: vec!["check_aur_availability".into()],
            ..Default::default()
        };
        let provider = MockProvider::new(behavior);
        let err = ExtensionHandle::load(&provider, Path::new("system_patcher.so"), Role::Patcher)
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingEntryPoint { ref entry_point, .. } if entry_point == "check_aur_availability"
        ));
        assert_eq!(provider.probe().live_modules(), 0);
        assert!(provider.probe().calls().contains(&"unload system_patcher.so".to_string()));
    }

    #[test]
    fn test_role_mismatch_refuses_instance() {
        let provider = MockProvider::new(MockBehavior::default());
        let handle =
            ExtensionHandle::load(&provider, Path::new("fresh_install.so"), Role::Installer)
                .unwrap();
        assert!(handle.create_patcher().is_err());
        assert!(handle.create_installer().is_ok());
    }
}
