//! Command invocation descriptors and results.
//!
//! The runner that actually spawns processes lives in the binary crate;
//! this module only holds the data that crosses that boundary.

use std::time::Duration;

use crate::error::RunError;

/// Exit status reported when the timeout guard killed the child.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit status reported when no child process could be created.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Default ceiling for ordinary commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Tighter ceiling for commands run under privilege elevation.
pub const PRIVILEGED_TIMEOUT: Duration = Duration::from_secs(60);

/// A single command invocation. Built per call and thrown away afterwards.
#[derive(Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Argument string, passed to the shell verbatim
    pub args: String,
    /// Hard ceiling on wall-clock time
    pub timeout: Duration,
    /// Credential piped to the elevation wrapper, if the command is privileged
    pub credential: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: String::new(),
            timeout: DEFAULT_TIMEOUT,
            credential: None,
        }
    }

    /// Build a command from a full shell command line
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(command)
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mark the command as privileged. Uses the privileged timeout unless a
    /// shorter one was already set.
    pub fn privileged(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self.timeout = self.timeout.min(PRIVILEGED_TIMEOUT);
        self
    }

    pub fn is_privileged(&self) -> bool {
        self.credential.is_some()
    }

    /// The command line handed to the shell (without elevation)
    pub fn command_line(&self) -> String {
        if self.args.trim().is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args)
        }
    }
}

// Never print the credential.
impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .field("privileged", &self.is_privileged())
            .finish()
    }
}

/// Outcome of one command. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandResult {
    pub status: i32,
    pub output: Vec<String>,
}

impl CommandResult {
    pub fn new(status: i32, output: Vec<String>) -> Self {
        Self { status, output }
    }

    /// A child that could never be started
    pub fn spawn_failure() -> Self {
        Self {
            status: SPAWN_FAILURE_EXIT_CODE,
            output: Vec::new(),
        }
    }

    /// A child killed by the timeout guard. Appends the synthetic notice.
    pub fn timed_out(mut output: Vec<String>, timeout: Duration) -> Self {
        output.push(timeout_notice(timeout));
        Self {
            status: TIMEOUT_EXIT_CODE,
            output,
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn exited_via_timeout(&self) -> bool {
        self.status == TIMEOUT_EXIT_CODE
    }

    pub fn spawn_failed(&self) -> bool {
        self.status == SPAWN_FAILURE_EXIT_CODE
    }

    /// Map to the error taxonomy. `Ok` only for exit status 0.
    pub fn into_result(self, command: &str) -> Result<Vec<String>, RunError> {
        if self.success() {
            Ok(self.output)
        } else if self.exited_via_timeout() {
            Err(RunError::Timeout {
                command: command.to_string(),
            })
        } else if self.spawn_failed() {
            Err(RunError::SpawnFailure {
                command: command.to_string(),
                reason: "no child process could be created".into(),
            })
        } else {
            Err(RunError::NonZeroExit {
                command: command.to_string(),
                status: self.status,
            })
        }
    }
}

pub fn timeout_notice(timeout: Duration) -> String {
    format!("Command timed out after {} seconds", timeout.as_secs())
}

/// Quote a value for a POSIX shell using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags_are_derived() {
        for status in [-1, 0, 1, 2, 124, 127, 255] {
            let result = CommandResult::new(status, vec![]);
            assert_eq!(result.success(), status == 0);
            assert_eq!(result.exited_via_timeout(), status == TIMEOUT_EXIT_CODE);
            assert!(!(result.success() && result.exited_via_timeout()));
        }
    }

    #[test]
    fn test_timed_out_appends_notice() {
        let result = CommandResult::timed_out(vec!["partial".into()], Duration::from_secs(1));
        assert!(!result.success());
        assert!(result.exited_via_timeout());
        assert_eq!(result.output.len(), 2);
        assert_eq!(result.output[1], "Command timed out after 1 seconds");
    }

    #[test]
    fn test_into_result_maps_taxonomy() {
        let ok = CommandResult::new(0, vec!["done".into()]).into_result("true");
        assert_eq!(ok.unwrap(), vec!["done".to_string()]);

        let err = CommandResult::new(3, vec![]).into_result("false");
        assert!(matches!(err, Err(RunError::NonZeroExit { status: 3, .. })));

        let err = CommandResult::timed_out(vec![], Duration::from_secs(5)).into_result("sleep");
        assert!(matches!(err, Err(RunError::Timeout { .. })));

        let err = CommandResult::spawn_failure().into_result("nope");
        assert!(matches!(err, Err(RunError::SpawnFailure { .. })));
    }

    #[test]
    fn test_privileged_tightens_timeout() {
        let spec = CommandSpec::shell("pacman -Syu").privileged("hunter2");
        assert_eq!(spec.timeout, PRIVILEGED_TIMEOUT);

        let short = CommandSpec::shell("true")
            .with_timeout(Duration::from_secs(5))
            .privileged("hunter2");
        assert_eq!(short.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_debug_hides_credential() {
        let spec = CommandSpec::shell("true").privileged("hunter2");
        let rendered = format!("{:?}", spec);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("privileged: true"));
    }

    #[test]
    fn test_command_line_and_quoting() {
        let spec = CommandSpec::new("pacman").with_args("-Ss git");
        assert_eq!(spec.command_line(), "pacman -Ss git");
        assert_eq!(CommandSpec::new("true").command_line(), "true");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
