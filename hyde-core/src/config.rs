use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{DEFAULT_TIMEOUT, PRIVILEGED_TIMEOUT};
use crate::session::{Action, MenuOption};

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "HYDE_TUI_CONFIG";

const CONFIG_NAMES: [&str; 4] = ["hyde.yaml", "hyde.yml", ".hyde.yaml", ".hyde.yml"];

/// Where the extension modules live
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ModulesConfig {
    /// Directory holding the modules
    #[serde(default = "default_module_dir")]
    pub dir: PathBuf,
    /// Module file for the patcher role
    #[serde(default = "default_patcher_module")]
    pub patcher: String,
    /// Module file for the installer role
    #[serde(default = "default_installer_module")]
    pub installer: String,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            dir: default_module_dir(),
            patcher: default_patcher_module(),
            installer: default_installer_module(),
        }
    }
}

fn default_module_dir() -> PathBuf {
    PathBuf::from("./Build/lib")
}
fn default_patcher_module() -> String {
    "system_patcher.so".into()
}
fn default_installer_module() -> String {
    "fresh_install.so".into()
}

/// Command timeouts in seconds
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_secs: u64,
    #[serde(default = "default_privileged_secs")]
    pub privileged_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: default_timeout_secs(),
            privileged_secs: default_privileged_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }

    pub fn privileged_timeout(&self) -> Duration {
        Duration::from_secs(self.privileged_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}
fn default_privileged_secs() -> u64 {
    PRIVILEGED_TIMEOUT.as_secs()
}

/// One menu entry.
///
/// `action: fresh_install` runs the extension flow, `script: <name>` runs a
/// script from `scripts_dir`, and neither leaves the entry inert.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct MenuEntryConfig {
    pub label: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
}

impl MenuEntryConfig {
    fn fresh_install(label: &str) -> Self {
        Self {
            label: label.into(),
            action: Some("fresh_install".into()),
            script: None,
        }
    }

    fn script(label: &str, script: &str) -> Self {
        Self {
            label: label.into(),
            action: None,
            script: Some(script.into()),
        }
    }

    fn inert(label: &str) -> Self {
        Self {
            label: label.into(),
            action: None,
            script: None,
        }
    }

    fn to_action(&self) -> Result<Option<Action>, ConfigError> {
        match (self.action.as_deref(), &self.script) {
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousEntry {
                label: self.label.clone(),
            }),
            (Some("fresh_install"), None) => Ok(Some(Action::FreshInstall)),
            (Some("none"), None) | (None, None) => Ok(None),
            (Some(other), None) => Err(ConfigError::UnknownAction {
                label: self.label.clone(),
                action: other.to_string(),
            }),
            (None, Some(script)) => Ok(Some(Action::RunScript {
                script: script.clone(),
            })),
        }
    }
}

fn default_menu() -> Vec<MenuEntryConfig> {
    vec![
        MenuEntryConfig::fresh_install("1) Fresh Install"),
        MenuEntryConfig::script("2) Update", "update.sh"),
        MenuEntryConfig::script("3) Theme Patcher", "themepatcher.sh"),
        MenuEntryConfig::inert("4) Editor"),
    ]
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_requirements() -> PathBuf {
    PathBuf::from("requirements.json")
}
fn default_sysinfo_command() -> String {
    "fastfetch --logo none --config ~/.config/fastfetch/tui.jsonc".into()
}
fn default_sysinfo_lines() -> usize {
    10
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct HydeConfig {
    #[serde(default)]
    pub modules: ModulesConfig,

    /// Directory the menu scripts are resolved against
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    /// Menu entries in display order
    #[serde(default = "default_menu")]
    pub menu: Vec<MenuEntryConfig>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// JSON package manifest read by the installer
    #[serde(default = "default_requirements")]
    pub requirements: PathBuf,

    /// Command whose output fills the system-info panel
    #[serde(default = "default_sysinfo_command")]
    pub sysinfo_command: String,

    #[serde(default = "default_sysinfo_lines")]
    pub sysinfo_lines: usize,

    /// Diagnostic log file for the interactive mode
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for HydeConfig {
    fn default() -> Self {
        Self {
            modules: ModulesConfig::default(),
            scripts_dir: default_scripts_dir(),
            menu: default_menu(),
            timeouts: TimeoutConfig::default(),
            requirements: default_requirements(),
            sysinfo_command: default_sysinfo_command(),
            sysinfo_lines: default_sysinfo_lines(),
            log_file: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("menu has no entries")]
    EmptyMenu,
    #[error("menu entry {index} has an empty label")]
    EmptyLabel { index: usize },
    #[error("menu entry '{label}' sets both `action` and `script`")]
    AmbiguousEntry { label: String },
    #[error("menu entry '{label}' has unknown action '{action}'")]
    UnknownAction { label: String, action: String },
    #[error("timeout '{name}' must be greater than zero")]
    ZeroTimeout { name: &'static str },
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

impl HydeConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: HydeConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Explicit path wins; otherwise discover, falling back to defaults when
    /// nothing is found. Parse and validation errors are still reported.
    pub fn resolve(
        explicit: Option<&Path>,
        start_dir: &Path,
    ) -> Result<(Option<PathBuf>, Self), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Some(path.to_path_buf()), Self::load(path)?));
        }
        match Self::discover(start_dir) {
            Ok((path, config)) => Ok((Some(path), config)),
            Err(ConfigError::NotFound { .. }) => Ok((None, Self::default())),
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.menu.is_empty() {
            return Err(ConfigError::EmptyMenu);
        }
        for (index, entry) in self.menu.iter().enumerate() {
            if entry.label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel { index });
            }
            entry.to_action()?;
        }
        if self.timeouts.default_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                name: "default_secs",
            });
        }
        if self.timeouts.privileged_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                name: "privileged_secs",
            });
        }
        Ok(())
    }

    /// Menu options with their resolved actions
    pub fn menu_options(&self) -> Result<Vec<MenuOption>, ConfigError> {
        self.menu
            .iter()
            .map(|entry| {
                Ok(MenuOption {
                    label: entry.label.clone(),
                    action: entry.to_action()?,
                })
            })
            .collect()
    }

    pub fn patcher_module(&self) -> PathBuf {
        self.modules.dir.join(&self.modules.patcher)
    }

    pub fn installer_module(&self) -> PathBuf {
        self.modules.dir.join(&self.modules.installer)
    }

    pub fn script_path(&self, script: &str) -> PathBuf {
        self.scripts_dir.join(script)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("hyde-tui.log"))
    }
}
