//! Error taxonomy for commands, extension loading and the install flow.
//!
//! The `Display` text of every variant is what ends up in the session log,
//! so keep it readable.

use std::fmt;

use thiserror::Error;

/// Failures of a single external command
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("failed to start `{command}`: {reason}")]
    SpawnFailure { command: String, reason: String },
    #[error("`{command}` exited with status {status}")]
    NonZeroExit { command: String, status: i32 },
    #[error("`{command}` timed out")]
    Timeout { command: String },
}

/// Failures while opening an extension module
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("extension module not found: {module}")]
    NotFound { module: String },
    #[error("extension module {module} is missing entry point `{entry_point}`")]
    MissingEntryPoint { module: String, entry_point: String },
}

/// The extension calls of the fresh-install flow that can fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleStep {
    Initialize,
    UpdateMirrorlist,
    InstallAurHelper,
    RunInstallation,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::UpdateMirrorlist => write!(f, "update mirrorlist"),
            Self::InstallAurHelper => write!(f, "install AUR helper"),
            Self::RunInstallation => write!(f, "run installation"),
        }
    }
}

/// Why a fresh-install sequence was aborted
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Error loading {module}: module not found")]
    ModuleNotFound { module: String },
    #[error("Error loading {module}: missing entry point `{entry_point}`")]
    MissingEntryPoint { module: String, entry_point: String },
    #[error("Validation failed: {message}")]
    ValidationFailure { message: String },
    #[error("Extension step failed: {step}")]
    ExtensionStepFailure { step: LifecycleStep },
}

impl From<LoadError> for LifecycleError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::NotFound { module } => Self::ModuleNotFound { module },
            LoadError::MissingEntryPoint {
                module,
                entry_point,
            } => Self::MissingEntryPoint {
                module,
                entry_point,
            },
        }
    }
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure {
            message: message.into(),
        }
    }

    pub fn step(step: LifecycleStep) -> Self {
        Self::ExtensionStepFailure { step }
    }
}
