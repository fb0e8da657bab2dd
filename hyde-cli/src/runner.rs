use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use hyde_core::command::{CommandResult, CommandSpec, SPAWN_FAILURE_EXIT_CODE, shell_quote};

/// Read buffer size for child output
const READ_CHUNK: usize = 4096;

/// Grace period between SIGTERM and SIGKILL on timeout
const KILL_GRACE: Duration = Duration::from_millis(500);

/// How long output is still read once the shell has exited
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Runs external commands through `sh`, merging stderr into stdout.
#[derive(Clone, Debug)]
pub struct CommandRunner {
    /// Where one-shot privileged scripts are written
    scratch_dir: PathBuf,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::with_scratch_dir(std::env::temp_dir())
    }

    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Run to completion and return the combined output.
    pub async fn run(&self, spec: &CommandSpec) -> CommandResult {
        self.execute(spec, None).await
    }

    /// Like [`CommandRunner::run`], but every line is also sent to `lines`
    /// the moment it is read.
    pub async fn run_streaming(
        &self,
        spec: &CommandSpec,
        lines: &mpsc::UnboundedSender<String>,
    ) -> CommandResult {
        self.execute(spec, Some(lines)).await
    }

    async fn execute(
        &self,
        spec: &CommandSpec,
        lines: Option<&mpsc::UnboundedSender<String>>,
    ) -> CommandResult {
        let command_line = spec.command_line();

        let Some(credential) = &spec.credential else {
            tracing::debug!(command = %command_line, timeout = ?spec.timeout, "running command");
            return run_shell(&command_line, spec.timeout, lines).await;
        };

        tracing::debug!(command = %command_line, timeout = ?spec.timeout, "running privileged command");
        let script = match ScratchScript::privileged(&self.scratch_dir, credential, &command_line) {
            Ok(script) => script,
            Err(e) => {
                tracing::warn!(error = %e, "failed to write privileged script");
                return CommandResult::spawn_failure();
            }
        };

        let result = run_shell(&script.invocation(), spec.timeout, lines).await;
        drop(script);
        result
    }

    /// Run an unprivileged command whose own `sudo -A` calls answer with
    /// `credential`. The command sees the askpass script as `$SUDO_ASKPASS`.
    pub async fn run_with_askpass(&self, spec: &CommandSpec, credential: &str) -> CommandResult {
        let command_line = spec.command_line();
        tracing::debug!(command = %command_line, timeout = ?spec.timeout, "running command with askpass");

        let askpass = match ScratchScript::askpass(&self.scratch_dir, credential) {
            Ok(script) => script,
            Err(e) => {
                tracing::warn!(error = %e, "failed to write askpass script");
                return CommandResult::spawn_failure();
            }
        };

        let line = format!(
            "SUDO_ASKPASS={}\nexport SUDO_ASKPASS\n{}",
            shell_quote(&askpass.path().to_string_lossy()),
            command_line
        );
        let result = run_shell(&line, spec.timeout, None).await;
        drop(askpass);
        result
    }
}

/// Credential-bearing script in the scratch dir. Removed when dropped, whatever
/// happened while it ran.
struct ScratchScript {
    path: PathBuf,
}

impl ScratchScript {
    /// Pipes the credential into `sudo -S` for one command line.
    fn privileged(dir: &Path, credential: &str, command_line: &str) -> io::Result<Self> {
        let body = format!(
            "printf '%s\\n' {} | sudo -S -p '' sh -c {}",
            shell_quote(credential),
            shell_quote(command_line)
        );
        Self::create(dir, "hyde-sudo", 0o600, &body)
    }

    /// `SUDO_ASKPASS` target. sudo execs it, so it keeps the owner exec bit.
    fn askpass(dir: &Path, credential: &str) -> io::Result<Self> {
        let body = format!("printf '%s\\n' {}", shell_quote(credential));
        Self::create(dir, "hyde-askpass", 0o700, &body)
    }

    fn create(dir: &Path, prefix: &str, mode: u32, body: &str) -> io::Result<Self> {
        let path = dir.join(format!("{}-{}.sh", prefix, Uuid::new_v4()));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&path)?;
        let script = Self { path };

        writeln!(file, "#!/bin/sh")?;
        writeln!(file, "{}", body)?;
        file.flush()?;

        Ok(script)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Read by `sh` rather than exec'd, so a `noexec` scratch dir still works.
    fn invocation(&self) -> String {
        format!("sh {}", shell_quote(&self.path.to_string_lossy()))
    }
}

impl Drop for ScratchScript {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch script");
        }
    }
}

async fn run_shell(
    command_line: &str,
    timeout: Duration,
    lines: Option<&mpsc::UnboundedSender<String>>,
) -> CommandResult {
    let mut cmd = Command::new("sh");
    cmd.arg("-c");
    cmd.arg(format!("exec 2>&1\n{}", command_line));

    // Own process group so a timeout can take down the whole tree
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(command = %command_line, error = %e, "spawn failed");
            return CommandResult::spawn_failure();
        }
    };
    let pgid = child.id().map(|pid| pid as i32).unwrap_or(-1);

    // The reader runs on its own so a background process that inherited
    // the pipe cannot hold the run open past the shell's exit.
    let (collected_tx, mut collected) = mpsc::unbounded_channel();
    let reader = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(read_lines(stdout, collected_tx, lines.cloned())));

    let outcome = tokio::time::timeout(timeout, child.wait()).await;
    if outcome.is_err() {
        tracing::warn!(command = %command_line, ?timeout, "command timed out");
        kill_process_group(&mut child, pgid).await;
    }
    drain_reader(reader).await;

    let mut output = Vec::new();
    while let Ok(line) = collected.try_recv() {
        output.push(line);
    }

    match outcome {
        Ok(Ok(status)) => CommandResult::new(exit_code(status), output),
        Ok(Err(e)) => {
            tracing::warn!(command = %command_line, error = %e, "failed to wait for child");
            CommandResult::new(SPAWN_FAILURE_EXIT_CODE, output)
        }
        Err(_) => {
            let result = CommandResult::timed_out(output, timeout);
            if let (Some(tx), Some(notice)) = (lines, result.output.last()) {
                let _ = tx.send(notice.clone());
            }
            result
        }
    }
}

/// Give the reader a short window to pick up what the shell wrote before
/// exiting, then stop it.
async fn drain_reader(reader: Option<JoinHandle<()>>) {
    let Some(mut reader) = reader else {
        return;
    };
    if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
        tracing::debug!("output pipe still held open after exit, detaching");
        reader.abort();
    }
}

async fn read_lines<R>(
    stream: R,
    output: mpsc::UnboundedSender<String>,
    lines: Option<mpsc::UnboundedSender<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(READ_CHUNK, stream);
    let mut buf = Vec::with_capacity(READ_CHUNK);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = strip_terminator(&buf);
                if let Some(tx) = &lines {
                    let _ = tx.send(line.clone());
                }
                let _ = output.send(line);
            }
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading child output");
                break;
            }
        }
    }
}

/// Decode one raw line, dropping a single trailing `\n` or `\r\n`.
fn strip_terminator(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    SPAWN_FAILURE_EXIT_CODE
}

async fn kill_process_group(child: &mut Child, pgid: i32) {
    if pgid > 0 {
        #[cfg(unix)]
        unsafe {
            libc::killpg(pgid, libc::SIGTERM);
        }

        tokio::time::sleep(KILL_GRACE).await;

        if child.try_wait().ok().flatten().is_none() {
            #[cfg(unix)]
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    } else {
        let _ = child.start_kill();
    }
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyde_core::command::TIMEOUT_EXIT_CODE;

    #[tokio::test]
    async fn test_captures_interleaved_output_in_order() {
        let runner = CommandRunner::new();
        let spec = CommandSpec::shell("echo one; echo two >&2; echo three");
        let result = runner.run(&spec).await;

        assert!(result.success());
        assert_eq!(result.output, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let runner = CommandRunner::new();
        let result = runner
            .run(&CommandSpec::shell("echo partial; exit 3"))
            .await;

        assert!(!result.success());
        assert!(!result.exited_via_timeout());
        assert_eq!(result.status, 3);
        assert_eq!(result.output, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports() {
        let runner = CommandRunner::new();
        let spec = CommandSpec::shell("echo started; sleep 5").with_timeout(Duration::from_secs(1));
        let started = std::time::Instant::now();
        let result = runner.run(&spec).await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!result.success());
        assert!(result.exited_via_timeout());
        assert_eq!(result.status, TIMEOUT_EXIT_CODE);
        assert_eq!(result.output.first().map(String::as_str), Some("started"));
        assert_eq!(
            result.output.last().map(String::as_str),
            Some("Command timed out after 1 seconds")
        );
    }

    #[tokio::test]
    async fn test_background_child_does_not_hold_the_run_open() {
        let runner = CommandRunner::new();
        let spec = CommandSpec::shell("echo done; sleep 4 &").with_timeout(Duration::from_secs(1));
        let started = std::time::Instant::now();
        let result = runner.run(&spec).await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(result.success());
        assert!(!result.exited_via_timeout());
        assert_eq!(result.output, vec!["done"]);
    }

    #[tokio::test]
    async fn test_script_without_exec_bit_runs_through_sh() {
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("plain.sh");
        std::fs::write(&path, "echo from-script\nexit 4\n").unwrap();

        let line = format!("sh {}", shell_quote(&path.to_string_lossy()));
        let result = CommandRunner::new().run(&CommandSpec::shell(line)).await;
        assert_eq!(result.status, 4);
        assert_eq!(result.output, vec!["from-script"]);
    }

    #[tokio::test]
    async fn test_streaming_publishes_each_line() {
        let runner = CommandRunner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = runner
            .run_streaming(&CommandSpec::shell("printf 'a\\nb\\r\\nc'"), &tx)
            .await;

        assert_eq!(result.output, vec!["a", "b", "c"]);
        let mut streamed = Vec::new();
        while let Ok(line) = rx.try_recv() {
            streamed.push(line);
        }
        assert_eq!(streamed, result.output);
    }

    #[tokio::test]
    async fn test_privileged_script_is_removed() {
        let scratch = tempfile::tempdir().unwrap();
        let runner = CommandRunner::with_scratch_dir(scratch.path());
        let spec = CommandSpec::shell("true")
            .privileged("it's secret")
            .with_timeout(Duration::from_secs(5));

        // Whether or not sudo exists here, the script must not survive.
        let _ = runner.run(&spec).await;
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_privileged_script_contents() {
        let scratch = tempfile::tempdir().unwrap();
        let script =
            ScratchScript::privileged(scratch.path(), "it's", "reflector --latest 5").unwrap();
        let body = std::fs::read_to_string(script.path()).unwrap();
        assert!(body.starts_with("#!/bin/sh\n"));
        assert!(body.contains(r"'it'\''s'"));
        assert!(body.contains("sudo -S -p '' sh -c 'reflector --latest 5'"));

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(script.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(
            script.invocation(),
            format!("sh '{}'", script.path().display())
        );

        let path = script.path().to_path_buf();
        drop(script);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_askpass_answers_with_credential_then_disappears() {
        let scratch = tempfile::tempdir().unwrap();
        let runner = CommandRunner::with_scratch_dir(scratch.path());
        let spec = CommandSpec::shell(r#"echo "$SUDO_ASKPASS"; "$SUDO_ASKPASS""#);
        let result = runner.run_with_askpass(&spec, "it's").await;

        assert!(result.success());
        assert_eq!(result.output.len(), 2);
        assert!(result.output[0].contains("hyde-askpass-"));
        assert_eq!(result.output[1], "it's");
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_in_missing_scratch_dir() {
        let runner = CommandRunner::with_scratch_dir("/nonexistent/hyde-scratch");
        let result = runner
            .run(&CommandSpec::shell("true").privileged("pw"))
            .await;
        assert!(result.spawn_failed());
        assert!(result.output.is_empty());
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator(b"abc\n"), "abc");
        assert_eq!(strip_terminator(b"abc\r\n"), "abc");
        assert_eq!(strip_terminator(b"abc"), "abc");
        assert_eq!(strip_terminator(b"a\n\n"), "a\n");
    }
}
