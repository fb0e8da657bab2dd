//! The fresh-install flow.
//!
//! Loads the patcher and installer modules, walks the patcher through
//! initialize → mirrorlist → AUR readiness, then runs the installer. The
//! first failing step aborts the sequence. Instances and module handles are
//! plain owned values, so every early return drops them: instances first
//! (they are declared later), then the modules.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{LifecycleError, LifecycleStep};
use crate::extension::{AurHelper, ExtensionHandle, ExtensionProvider, Role};

pub const CREDENTIAL_PROMPT: &str = "Enter sudo password: ";
pub const AUR_HELPER_PROMPT: &str = "Select AUR helper (yay/paru): ";

/// What the lifecycle needs from whoever drives it: somewhere to put log
/// lines and a way to ask the user for a line of text.
#[async_trait]
pub trait Console: Send {
    fn log(&mut self, line: &str);

    /// Returns `None` when the user cancelled the prompt
    async fn prompt(&mut self, text: &str, masked: bool) -> Option<String>;
}

/// Module locations for one run
#[derive(Clone, Copy, Debug)]
pub struct ModulePaths<'a> {
    pub patcher: &'a Path,
    pub installer: &'a Path,
}

/// Run the whole sequence. Any failure is also written to the console as
/// a single line before being returned.
pub async fn run_fresh_install(
    provider: &dyn ExtensionProvider,
    paths: ModulePaths<'_>,
    console: &mut dyn Console,
) -> Result<(), LifecycleError> {
    let result = fresh_install_steps(provider, paths, console).await;
    match &result {
        Ok(()) => tracing::info!("fresh install completed"),
        Err(e) => {
            tracing::warn!(error = %e, "fresh install aborted");
            console.log(&e.to_string());
        }
    }
    result
}

async fn fresh_install_steps(
    provider: &dyn ExtensionProvider,
    paths: ModulePaths<'_>,
    console: &mut dyn Console,
) -> Result<(), LifecycleError> {
    let patcher_module = ExtensionHandle::load(provider, paths.patcher, Role::Patcher)?;
    let installer_module = ExtensionHandle::load(provider, paths.installer, Role::Installer)?;
    console.log(&format!(
        "Loaded extensions: {}, {}",
        patcher_module.name(),
        installer_module.name()
    ));

    let mut patcher = patcher_module.create_patcher()?;

    let credential = console
        .prompt(CREDENTIAL_PROMPT, true)
        .await
        .ok_or_else(|| LifecycleError::validation("credential entry cancelled"))?;

    if !patcher.initialize(&credential).await {
        append_logs(console, patcher.logs());
        return Err(LifecycleError::step(LifecycleStep::Initialize));
    }
    drop(credential);

    if !patcher.update_mirrorlist().await {
        append_logs(console, patcher.logs());
        return Err(LifecycleError::step(LifecycleStep::UpdateMirrorlist));
    }

    if !patcher.check_aur_available().await {
        let choice = console
            .prompt(AUR_HELPER_PROMPT, false)
            .await
            .unwrap_or_default();
        let helper: AurHelper = choice.trim().parse()?;

        if !patcher.install_aur_helper(helper).await {
            append_logs(console, patcher.logs());
            return Err(LifecycleError::step(LifecycleStep::InstallAurHelper));
        }
    }

    // AUR-readiness checkpoint reached
    append_logs(console, patcher.logs());

    let mut installer = installer_module.create_installer()?;
    let installed = installer.run_installation().await;
    append_logs(console, installer.logs());
    if !installed {
        return Err(LifecycleError::step(LifecycleStep::RunInstallation));
    }

    console.log("Fresh installation completed successfully");
    Ok(())
}

/// Copy an extension's log text into the console, one line at a time.
/// The string is released when this returns.
fn append_logs(console: &mut dyn Console, logs: String) {
    for line in logs.lines().filter(|l| !l.is_empty()) {
        console.log(line);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;

    use super::*;
    use crate::extension::mock::{MockBehavior, MockProvider};

    #[derive(Default)]
    struct ScriptedConsole {
        answers: VecDeque<Option<String>>,
        prompts: Vec<String>,
        lines: Vec<String>,
    }

    impl ScriptedConsole {
        fn answering(answers: &[Option<&str>]) -> Self {
            Self {
                answers: answers.iter().map(|a| a.map(String::from)).collect(),
                ..Default::default()
            }
        }

        fn logged(&self, needle: &str) -> bool {
            self.lines.iter().any(|l| l.contains(needle))
        }
    }

    #[async_trait]
    impl Console for ScriptedConsole {
        fn log(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }

        async fn prompt(&mut self, text: &str, _masked: bool) -> Option<String> {
            self.prompts.push(text.to_string());
            self.answers.pop_front().flatten()
        }
    }

    async fn run(
        behavior: MockBehavior,
        console: &mut ScriptedConsole,
    ) -> (MockProvider, Result<(), LifecycleError>) {
        let provider = MockProvider::new(behavior);
        let patcher = PathBuf::from("Build/lib/system_patcher.so");
        let installer = PathBuf::from("Build/lib/fresh_install.so");
        let result = run_fresh_install(
            &provider,
            ModulePaths {
                patcher: &patcher,
                installer: &installer,
            },
            console,
        )
        .await;
        (provider, result)
    }

    #[tokio::test]
    async fn test_happy_path_with_aur_helper_present() {
        let mut console = ScriptedConsole::answering(&[Some("pw")]);
        let (provider, result) = run(MockBehavior::default(), &mut console).await;

        assert!(result.is_ok());
        assert_eq!(console.prompts, vec![CREDENTIAL_PROMPT.to_string()]);
        assert!(console.logged("All packages installed successfully!"));
        assert!(console.logged("Fresh installation completed successfully"));
        assert!(!provider.probe().called("install_aur_helper"));
        assert!(provider.probe().is_clean());
    }

    #[tokio::test]
    async fn test_installs_chosen_aur_helper() {
        let mut console = ScriptedConsole::answering(&[Some("pw"), Some("paru\n")]);
        let behavior = MockBehavior {
            aur_available: false,
            ..Default::default()
        };
        let (provider, result) = run(behavior, &mut console).await;

        assert!(result.is_ok());
        assert_eq!(console.prompts.len(), 2);
        assert!(console.logged("paru installed successfully"));
        assert!(provider.probe().is_clean());
    }

    #[tokio::test]
    async fn test_invalid_helper_choice_aborts_before_install() {
        let mut console = ScriptedConsole::answering(&[Some("pw"), Some("zsh")]);
        let behavior = MockBehavior {
            aur_available: false,
            ..Default::default()
        };
        let (provider, result) = run(behavior, &mut console).await;

        assert!(matches!(
            result,
            Err(LifecycleError::ValidationFailure { .. })
        ));
        assert!(console.logged("Validation failed: invalid AUR helper 'zsh'"));
        assert!(!provider.probe().called("install_aur_helper"));
        assert!(!provider.probe().called("create_installer"));
        assert!(provider.probe().is_clean());
    }

    #[tokio::test]
    async fn test_initialize_failure_never_creates_installer() {
        let mut console = ScriptedConsole::answering(&[Some("wrong")]);
        let behavior = MockBehavior {
            initialize: false,
            ..Default::default()
        };
        let (provider, result) = run(behavior, &mut console).await;

        assert_eq!(
            result,
            Err(LifecycleError::step(LifecycleStep::Initialize))
        );
        assert!(console.logged("Error: Invalid sudo password"));
        assert!(!provider.probe().called("create_installer"));
        assert!(!provider.probe().called("run_installation"));
        assert!(!provider.probe().called("update_system_mirrorlist"));
        assert!(provider.probe().is_clean());
    }

    #[tokio::test]
    async fn test_cancelled_credential_aborts() {
        let mut console = ScriptedConsole::answering(&[None]);
        let (provider, result) = run(MockBehavior::default(), &mut console).await;

        assert!(matches!(
            result,
            Err(LifecycleError::ValidationFailure { .. })
        ));
        assert!(!provider.probe().called("initialize_patcher"));
        assert!(provider.probe().is_clean());
    }

    #[tokio::test]
    async fn test_cleanup_after_every_failure_point() {
        let cases: Vec<(MockBehavior, Option<&str>)> = vec![
            (
                MockBehavior {
                    absent_modules: vec!["system_patcher.so".into()],
                    ..Default::default()
                },
                None,
            ),
            (
                MockBehavior {
                    absent_modules: vec!["fresh_install.so".into()],
                    ..Default::default()
                },
                None,
            ),
            (
                MockBehavior {
                    missing_entry_points: vec!["free_installer_logs".into()],
                    ..Default::default()
                },
                None,
            ),
            (
                MockBehavior {
                    initialize: false,
                    ..Default::default()
                },
                None,
            ),
            (
                MockBehavior {
                    update_mirrorlist: false,
                    ..Default::default()
                },
                None,
            ),
            (
                MockBehavior {
                    aur_available: false,
                    install_aur_helper: false,
                    ..Default::default()
                },
                Some("yay"),
            ),
            (
                MockBehavior {
                    run_installation: false,
                    ..Default::default()
                },
                None,
            ),
        ];

        for (behavior, helper) in cases {
            let mut console = ScriptedConsole::answering(&[Some("pw"), helper]);
            let (provider, result) = run(behavior.clone(), &mut console).await;

            assert!(result.is_err(), "expected failure for {:?}", behavior);
            assert!(
                provider.probe().is_clean(),
                "leaked resources for {:?}: {:?}",
                behavior,
                provider.probe().calls()
            );
            let last = console.lines.last().cloned().unwrap_or_default();
            assert_eq!(last, result.unwrap_err().to_string());
        }
    }

    #[tokio::test]
    async fn test_missing_installer_module_releases_patcher_module() {
        let mut console = ScriptedConsole::answering(&[Some("pw")]);
        let behavior = MockBehavior {
            absent_modules: vec!["fresh_install.so".into()],
            ..Default::default()
        };
        let (provider, result) = run(behavior, &mut console).await;

        assert!(matches!(result, Err(LifecycleError::ModuleNotFound { .. })));
        assert!(provider.probe().called("unload system_patcher.so"));
        assert!(console.prompts.is_empty());
    }

    #[tokio::test]
    async fn test_installer_failure_destroys_both_instances() {
        let mut console = ScriptedConsole::answering(&[Some("pw")]);
        let behavior = MockBehavior {
            run_installation: false,
            ..Default::default()
        };
        let (provider, result) = run(behavior, &mut console).await;

        assert_eq!(
            result,
            Err(LifecycleError::step(LifecycleStep::RunInstallation))
        );
        assert!(console.logged("Failed to install pacman packages"));

        let calls = provider.probe().calls();
        let pos = |c: &str| calls.iter().position(|x| x == c).unwrap();
        assert!(pos("destroy_installer") < pos("destroy_patcher"));
        assert!(pos("destroy_patcher") < pos("unload fresh_install.so"));
        assert!(pos("unload fresh_install.so") < pos("unload system_patcher.so"));
    }
}
