use async_trait::async_trait;

use hyde_core::command::CommandSpec;
use hyde_core::extension::{AurHelper, Patcher};

use super::NativeContext;

/// Base packages makepkg needs
const BUILD_PREREQUISITES: &str = "git base-devel";

const MIRRORLIST_COMMAND: &str = "reflector --latest 5 --sort rate --save /etc/pacman.d/mirrorlist";

/// System patcher that shells out to pacman, reflector and makepkg.
pub struct NativePatcher {
    ctx: NativeContext,
    initialized: bool,
    logs: Vec<String>,
}

impl NativePatcher {
    pub fn new(ctx: NativeContext) -> Self {
        Self {
            ctx,
            initialized: false,
            logs: Vec::new(),
        }
    }

    fn add_log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    fn add_output(&mut self, output: &[String]) {
        for line in output {
            self.logs.push(format!("  {}", line));
        }
    }

    fn require_initialized(&mut self) -> bool {
        if !self.initialized {
            self.add_log("Error: SystemPatcher not initialized");
        }
        self.initialized
    }

    fn privileged(&self, command: &str) -> Option<CommandSpec> {
        let credential = self.ctx.credential()?;
        Some(
            CommandSpec::shell(command)
                .with_timeout(self.ctx.timeouts.privileged_timeout())
                .privileged(credential),
        )
    }

    /// Run a privileged command, logging its output when it fails
    async fn run_privileged(&mut self, command: &str) -> bool {
        let Some(spec) = self.privileged(command) else {
            self.add_log("Error: no credential available");
            return false;
        };
        let result = self.ctx.runner.run(&spec).await;
        if !result.success() {
            self.add_output(&result.output);
        }
        result.success()
    }

    async fn has_command(&self, name: &str) -> bool {
        let spec = CommandSpec::shell(format!("command -v {}", name))
            .with_timeout(self.ctx.timeouts.default_timeout());
        self.ctx.runner.run(&spec).await.success()
    }
}

#[async_trait]
impl Patcher for NativePatcher {
    async fn initialize(&mut self, credential: &str) -> bool {
        if self.initialized {
            self.add_log("SystemPatcher already initialized");
            return true;
        }

        let spec = CommandSpec::shell("true")
            .with_timeout(self.ctx.timeouts.privileged_timeout())
            .privileged(credential);
        if !self.ctx.runner.run(&spec).await.success() {
            self.add_log("Error: Invalid sudo password");
            return false;
        }

        self.ctx.set_credential(credential);
        self.initialized = true;
        self.add_log("SystemPatcher initialized successfully");
        true
    }

    async fn update_mirrorlist(&mut self) -> bool {
        if !self.require_initialized() {
            return false;
        }

        if self.run_privileged(MIRRORLIST_COMMAND).await {
            self.add_log("Mirrorlist updated successfully");
            true
        } else {
            self.add_log("Failed to update mirrorlist");
            false
        }
    }

    async fn check_aur_available(&mut self) -> bool {
        if !self.require_initialized() {
            return false;
        }

        for helper in AurHelper::ALL {
            if self.has_command(helper.as_str()).await {
                self.add_log(format!("AUR helper detected: {}", helper));
                return true;
            }
        }
        self.add_log("No AUR helper detected");
        false
    }

    async fn install_aur_helper(&mut self, helper: AurHelper) -> bool {
        if !self.require_initialized() {
            return false;
        }

        self.add_log(format!("Installing AUR helper: {}", helper));

        if !self
            .run_privileged(&format!(
                "pacman -S --needed --noconfirm {}",
                BUILD_PREREQUISITES
            ))
            .await
        {
            self.add_log(format!("Failed to install build prerequisites for {}", helper));
            return false;
        }

        // makepkg refuses to run as root, so build as the invoking user and
        // only install the finished package with elevation.
        let build_dir = std::env::temp_dir().join(format!("hyde-{}-{}", helper, std::process::id()));
        let build_dir_str = build_dir.to_string_lossy().into_owned();
        let build = CommandSpec::shell(format!(
            "rm -rf {dir} && git clone --depth 1 {url} {dir} && cd {dir} && makepkg --noconfirm",
            dir = hyde_core::command::shell_quote(&build_dir_str),
            url = bin_package_url(helper),
        ))
        .with_timeout(self.ctx.timeouts.default_timeout());
        let built = self.ctx.runner.run(&build).await;
        if !built.success() {
            self.add_output(&built.output);
            self.add_log(format!("Failed to install AUR helper: {}", helper));
            return false;
        }

        let installed = self
            .run_privileged(&format!(
                "pacman -U --noconfirm {}/*.pkg.tar.*",
                hyde_core::command::shell_quote(&build_dir_str)
            ))
            .await;
        let _ = std::fs::remove_dir_all(&build_dir);

        if installed {
            self.add_log(format!("{} installed successfully", helper));
            true
        } else {
            self.add_log(format!("Failed to install AUR helper: {}", helper));
            false
        }
    }

    fn logs(&self) -> String {
        self.logs.iter().map(|l| format!("{}\n", l)).collect()
    }
}

/// Prebuilt `-bin` package, so no toolchain is needed to bootstrap
fn bin_package_url(helper: AurHelper) -> String {
    format!("https://aur.archlinux.org/{}-bin.git", helper.as_str())
}

impl Drop for NativePatcher {
    fn drop(&mut self) {
        self.ctx.clear_credential();
    }
}
