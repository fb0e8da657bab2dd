//! Extension providers for the patcher and installer roles.
//!
//! The built-in provider serves both roles from native code compiled into
//! the binary. With the `dylib` feature, real shared objects found at the
//! configured module paths are loaded instead.

mod installer;
mod patcher;

#[cfg(feature = "dylib")]
mod dylib;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hyde_core::config::{HydeConfig, TimeoutConfig};
use hyde_core::error::LoadError;
use hyde_core::extension::mock::MockProvider;
use hyde_core::extension::{ExtensionProvider, Installer, Module, Patcher, Role};

use crate::runner::CommandRunner;

pub use installer::{NativeInstaller, Requirements};
pub use patcher::NativePatcher;

#[cfg(feature = "dylib")]
pub use dylib::DylibProvider;

/// Shared state for the built-in extensions. The patcher stores the
/// validated credential here so the installer can elevate too.
#[derive(Clone)]
pub struct NativeContext {
    pub runner: CommandRunner,
    pub timeouts: TimeoutConfig,
    pub requirements: PathBuf,
    credential: Arc<Mutex<Option<String>>>,
}

impl Default for NativeContext {
    fn default() -> Self {
        Self {
            runner: CommandRunner::new(),
            timeouts: TimeoutConfig::default(),
            requirements: PathBuf::from("requirements.json"),
            credential: Arc::new(Mutex::new(None)),
        }
    }
}

impl NativeContext {
    pub fn from_config(config: &HydeConfig) -> Self {
        Self {
            timeouts: config.timeouts.clone(),
            requirements: config.requirements.clone(),
            ..Self::default()
        }
    }

    pub fn credential(&self) -> Option<String> {
        self.credential
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn set_credential(&self, credential: &str) {
        let mut slot = self.credential.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(credential.to_string());
    }

    /// Forget the credential. Called when a native instance is dropped.
    pub fn clear_credential(&self) {
        let mut slot = self.credential.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuiltinKind {
    Patcher,
    Installer,
}

impl BuiltinKind {
    /// Recognise a module by its file stem
    fn from_path(path: &Path) -> Option<Self> {
        match path.file_stem()?.to_str()? {
            "system_patcher" => Some(Self::Patcher),
            "fresh_install" => Some(Self::Installer),
            _ => None,
        }
    }

    fn role(&self) -> Role {
        match self {
            Self::Patcher => Role::Patcher,
            Self::Installer => Role::Installer,
        }
    }
}

/// Serves the patcher and installer roles from native code.
pub struct BuiltinProvider {
    ctx: NativeContext,
}

impl BuiltinProvider {
    pub fn new(ctx: NativeContext) -> Self {
        Self { ctx }
    }
}

impl ExtensionProvider for BuiltinProvider {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Module>, LoadError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let kind = BuiltinKind::from_path(path).ok_or(LoadError::NotFound {
            module: name.clone(),
        })?;

        Ok(Box::new(BuiltinModule {
            name,
            kind,
            ctx: self.ctx.clone(),
        }))
    }
}

struct BuiltinModule {
    name: String,
    kind: BuiltinKind,
    ctx: NativeContext,
}

impl Module for BuiltinModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_entry_point(&self, name: &str) -> bool {
        self.kind.role().entry_points().contains(&name)
    }

    fn create_patcher(&self) -> Option<Box<dyn Patcher>> {
        (self.kind == BuiltinKind::Patcher)
            .then(|| Box::new(NativePatcher::new(self.ctx.clone())) as Box<dyn Patcher>)
    }

    fn create_installer(&self) -> Option<Box<dyn Installer>> {
        (self.kind == BuiltinKind::Installer)
            .then(|| Box::new(NativeInstaller::new(self.ctx.clone())) as Box<dyn Installer>)
    }
}

/// Pick the provider for this run
pub fn select_provider(config: &HydeConfig, demo: bool) -> Arc<dyn ExtensionProvider> {
    if demo {
        tracing::info!("using mock extensions (demo mode)");
        return Arc::new(MockProvider::demo());
    }

    #[cfg(feature = "dylib")]
    if config.patcher_module().exists() && config.installer_module().exists() {
        tracing::info!(dir = %config.modules.dir.display(), "using shared-object extensions");
        return Arc::new(DylibProvider);
    }

    tracing::info!("using built-in extensions");
    Arc::new(BuiltinProvider::new(NativeContext::from_config(config)))
}
