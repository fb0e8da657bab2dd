use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use hyde_core::command::{CommandResult, CommandSpec, shell_quote};
use hyde_core::extension::{AurHelper, Installer};

use super::NativeContext;

/// Package manifest read from `requirements.json`
#[derive(Debug, Deserialize)]
pub struct Requirements {
    pub packages: Vec<String>,
}

impl Requirements {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Could not open {}: {}", path.display(), e))?;
        serde_json::from_str(&content).map_err(|e| e.to_string())
    }
}

/// How privileged commands get their elevation
enum Elevation {
    Root,
    Sudo(String),
}

/// Who an AUR helper runs as. makepkg refuses root, so the helper is
/// always unprivileged and escalates through its own sudo calls.
#[derive(Debug, PartialEq, Eq)]
enum AurRunAs {
    /// Current user; sudo asks the askpass script for the credential
    Askpass(String),
    /// Root dropping back to the user who invoked sudo
    User(String),
}

impl AurRunAs {
    fn for_elevation(elevation: &Elevation, sudo_user: Option<String>) -> Option<Self> {
        match elevation {
            Elevation::Sudo(credential) => Some(Self::Askpass(credential.clone())),
            Elevation::Root => sudo_user
                .filter(|user| !user.is_empty() && user != "root")
                .map(Self::User),
        }
    }

    fn command(&self, helper: AurHelper, pkg: &str) -> String {
        match self {
            Self::Askpass(_) => format!(
                "{} -S --needed --noconfirm --sudoflags -A {}",
                helper,
                shell_quote(pkg)
            ),
            Self::User(user) => format!(
                "sudo -u {} -- {} -S --needed --noconfirm {}",
                shell_quote(user),
                helper,
                shell_quote(pkg)
            ),
        }
    }
}

/// Installs the manifest's packages from the official repos and the AUR.
pub struct NativeInstaller {
    ctx: NativeContext,
    pacman_packages: Vec<String>,
    aur_packages: Vec<String>,
    logs: Vec<String>,
}

impl NativeInstaller {
    pub fn new(ctx: NativeContext) -> Self {
        Self {
            ctx,
            pacman_packages: Vec::new(),
            aur_packages: Vec::new(),
            logs: Vec::new(),
        }
    }

    fn add_log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    fn elevation(&self) -> Option<Elevation> {
        // SAFETY: geteuid has no preconditions and cannot fail.
        if unsafe { libc::geteuid() } == 0 {
            return Some(Elevation::Root);
        }
        self.ctx.credential().map(Elevation::Sudo)
    }

    fn spec(&self, command: String) -> CommandSpec {
        CommandSpec::shell(command).with_timeout(self.ctx.timeouts.default_timeout())
    }

    async fn categorize_packages(&mut self) -> bool {
        let requirements = match Requirements::load(&self.ctx.requirements) {
            Ok(r) => r,
            Err(e) => {
                self.add_log(format!("Error reading requirements: {}", e));
                return false;
            }
        };

        for pkg in requirements.packages {
            let spec = self.spec(format!("pacman -Si {}", shell_quote(&pkg)));
            if self.ctx.runner.run(&spec).await.success() {
                self.add_log(format!("Package {} will be installed via pacman", pkg));
                self.pacman_packages.push(pkg);
            } else {
                self.add_log(format!("Package {} will be installed via AUR", pkg));
                self.aur_packages.push(pkg);
            }
        }
        true
    }

    async fn install_pacman_packages(&mut self, elevation: &Elevation) -> bool {
        if self.pacman_packages.is_empty() {
            self.add_log("No packages to install via pacman");
            return true;
        }

        let packages: Vec<String> = self
            .pacman_packages
            .iter()
            .map(|p| shell_quote(p))
            .collect();
        let mut spec = self.spec(format!("pacman -S --needed --noconfirm {}", packages.join(" ")));
        if let Elevation::Sudo(credential) = elevation {
            // Package downloads outlast the privileged ceiling.
            spec = spec.privileged(credential.clone());
            spec.timeout = self.ctx.timeouts.default_timeout();
        }

        let result = self.ctx.runner.run(&spec).await;
        if result.success() {
            self.add_log("Successfully installed pacman packages");
            true
        } else {
            for line in &result.output {
                self.logs.push(format!("  {}", line));
            }
            self.add_log("Failed to install pacman packages");
            false
        }
    }

    async fn detect_aur_helper(&self) -> Option<AurHelper> {
        for helper in AurHelper::ALL {
            let spec = self.spec(format!("command -v {}", helper.as_str()));
            if self.ctx.runner.run(&spec).await.success() {
                return Some(helper);
            }
        }
        None
    }

    async fn run_aur_helper(&self, run_as: &AurRunAs, helper: AurHelper, pkg: &str) -> CommandResult {
        let spec = self.spec(run_as.command(helper, pkg));
        match run_as {
            AurRunAs::Askpass(credential) => self.ctx.runner.run_with_askpass(&spec, credential).await,
            AurRunAs::User(_) => self.ctx.runner.run(&spec).await,
        }
    }

    async fn install_aur_packages(&mut self, elevation: &Elevation) -> bool {
        if self.aur_packages.is_empty() {
            self.add_log("No packages to install via AUR");
            return true;
        }

        let sudo_user = std::env::var("SUDO_USER").ok();
        let Some(run_as) = AurRunAs::for_elevation(elevation, sudo_user) else {
            self.add_log("Error: AUR packages cannot be built as root and SUDO_USER is not set");
            return false;
        };

        let Some(helper) = self.detect_aur_helper().await else {
            self.add_log("No AUR helper found");
            return false;
        };

        let packages = std::mem::take(&mut self.aur_packages);
        for pkg in &packages {
            let result = self.run_aur_helper(&run_as, helper, pkg).await;
            if !result.success() {
                for line in &result.output {
                    self.logs.push(format!("  {}", line));
                }
                self.add_log(format!("Failed to install AUR package: {}", pkg));
                self.aur_packages = packages;
                return false;
            }
            self.add_log(format!("Successfully installed AUR package: {}", pkg));
        }
        true
    }
}

#[async_trait]
impl Installer for NativeInstaller {
    async fn run_installation(&mut self) -> bool {
        let Some(elevation) = self.elevation() else {
            self.add_log("Error: This script must be run as root");
            return false;
        };

        self.add_log("Starting package installation...");

        if !self.categorize_packages().await {
            return false;
        }
        if !self.install_pacman_packages(&elevation).await {
            return false;
        }
        if !self.install_aur_packages(&elevation).await {
            return false;
        }

        self.add_log("All packages installed successfully!");
        true
    }

    fn logs(&self) -> String {
        self.logs.iter().map(|l| format!("{}\n", l)).collect()
    }
}

impl Drop for NativeInstaller {
    fn drop(&mut self) {
        self.ctx.clear_credential();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.json");
        std::fs::write(&path, r#"{"packages": ["hyprland", "waybar"]}"#).unwrap();

        let requirements = Requirements::load(&path).unwrap();
        assert_eq!(requirements.packages, vec!["hyprland", "waybar"]);

        std::fs::write(&path, r#"{"pkgs": []}"#).unwrap();
        assert!(Requirements::load(&path).is_err());

        let missing = Requirements::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(missing.starts_with("Could not open"));
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_installation() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = NativeContext::default();
        ctx.requirements = dir.path().join("absent.json");
        ctx.set_credential("pw");

        let mut installer = NativeInstaller::new(ctx);
        assert!(!installer.run_installation().await);
        let logs = installer.logs();
        assert!(logs.contains("Starting package installation..."));
        assert!(logs.contains("Error reading requirements: Could not open"));
    }

    #[test]
    fn test_aur_helper_never_runs_as_root() {
        let sudo = Elevation::Sudo("pw".into());
        let run_as = AurRunAs::for_elevation(&sudo, None).unwrap();
        assert_eq!(run_as, AurRunAs::Askpass("pw".into()));
        assert_eq!(
            run_as.command(AurHelper::Yay, "wlogout"),
            "yay -S --needed --noconfirm --sudoflags -A 'wlogout'"
        );

        let run_as = AurRunAs::for_elevation(&Elevation::Root, Some("ana".into())).unwrap();
        assert_eq!(
            run_as.command(AurHelper::Paru, "wlogout"),
            "sudo -u 'ana' -- paru -S --needed --noconfirm 'wlogout'"
        );

        assert_eq!(AurRunAs::for_elevation(&Elevation::Root, None), None);
        assert_eq!(AurRunAs::for_elevation(&Elevation::Root, Some("root".into())), None);
        assert_eq!(AurRunAs::for_elevation(&Elevation::Root, Some(String::new())), None);
    }
}
