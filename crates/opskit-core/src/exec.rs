//! External command execution for the tuning, maintenance and mirror
//! subsystems.
//!
//! Every system mutation goes through [`Cmd`] so that:
//! - commands that need root are prefixed with `sudo` when the process is
//!   not already running as root,
//! - `--dry-run` can print exactly the argv that would run ([`Cmd::display`]),
//! - executed commands are logged at debug level,
//! - a missing binary maps to a typed [`OpsError::CommandMissing`] instead of
//!   a raw spawn error.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use crate::error::{OpsError, Result};

// ---------------------------------------------------------------------------
// Cmd
// ---------------------------------------------------------------------------

/// One external command invocation, built up before running.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    needs_root: bool,
    stdin: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            needs_root: false,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark this command as requiring root. When the current process is not
    /// root, the argv gains a `sudo` prefix.
    pub fn needs_root(mut self) -> Self {
        self.needs_root = true;
        self
    }

    /// Feed `input` to the command's stdin (used for `tee` writes to
    /// root-owned files).
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// The full argv this command will run as, sudo prefix included.
    pub fn argv(&self) -> Vec<String> {
        self.argv_as(is_root())
    }

    /// The argv as it would run for a given effective uid. Lets tests assert
    /// exact command lines regardless of who runs the test suite.
    pub(crate) fn argv_as(&self, as_root: bool) -> Vec<String> {
        let mut v = Vec::with_capacity(self.args.len() + 2);
        if self.needs_root && !as_root {
            v.push("sudo".to_string());
        }
        v.push(self.program.clone());
        v.extend(self.args.iter().cloned());
        v
    }

    /// Shell-style rendering of the argv, for dry-run output and errors.
    pub fn display(&self) -> String {
        self.argv()
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run with inherited stdio and fail on a non-zero exit.
    /// Commands with stdin input get their stdout silenced (`tee` would
    /// otherwise echo the whole file to the terminal).
    pub fn run_checked(&self) -> Result<()> {
        tracing::debug!(cmd = %self.display(), "exec");
        let mut command = self.build()?;

        if self.stdin.is_some() {
            command.stdin(Stdio::piped());
            command.stdout(Stdio::null());
        }

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;
        if let (Some(input), Some(mut stdin)) = (&self.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes())?;
        }

        let status = child.wait()?;
        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(OpsError::CommandFailed {
                cmd: self.display(),
                code,
                stderr: String::new(),
            }),
            None => Err(OpsError::CommandKilled(self.display())),
        }
    }

    /// Run with captured output. Non-zero exits are NOT an error here; the
    /// caller inspects [`CmdOutput::code`] (probes and rsync need this).
    pub fn output(&self) -> Result<CmdOutput> {
        tracing::debug!(cmd = %self.display(), "exec");
        let mut command = self.build()?;
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        if self.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;
        if let (Some(input), Some(mut stdin)) = (&self.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes())?;
        }

        let out = child.wait_with_output()?;
        let code = match out.status.code() {
            Some(c) => c,
            None => return Err(OpsError::CommandKilled(self.display())),
        };

        Ok(CmdOutput {
            code,
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    /// Like [`Cmd::output`], but non-zero exits become [`OpsError::CommandFailed`]
    /// carrying a stderr tail.
    pub fn output_checked(&self) -> Result<CmdOutput> {
        let out = self.output()?;
        if out.code != 0 {
            return Err(OpsError::CommandFailed {
                cmd: self.display(),
                code: out.code,
                stderr: stderr_tail(&out.stderr),
            });
        }
        Ok(out)
    }

    fn build(&self) -> Result<std::process::Command> {
        let argv = self.argv();
        let mut command = std::process::Command::new(&argv[0]);
        command.args(&argv[1..]);
        Ok(command)
    }

    fn spawn_error(&self, e: std::io::Error) -> OpsError {
        if e.kind() == std::io::ErrorKind::NotFound {
            OpsError::CommandMissing(self.argv()[0].clone())
        } else {
            OpsError::Io(e)
        }
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Whether `name` resolves on PATH.
pub fn available(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Resolve `name` on PATH or fail with [`OpsError::CommandMissing`].
pub fn require(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| OpsError::CommandMissing(name.to_string()))
}

/// Whether the current process runs as root (euid 0).
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Last ~400 chars of stderr, prefixed with a newline for error display.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let start = trimmed
        .char_indices()
        .rev()
        .nth(399)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("\n{}", &trimmed[start..])
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,%+@^".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_gains_sudo_when_not_root() {
        let cmd = Cmd::new("sysctl").args(["-w", "vm.swappiness=10"]).needs_root();
        assert_eq!(cmd.argv_as(false), vec!["sudo", "sysctl", "-w", "vm.swappiness=10"]);
        assert_eq!(cmd.argv_as(true), vec!["sysctl", "-w", "vm.swappiness=10"]);
    }

    #[test]
    fn argv_without_root_flag_never_gains_sudo() {
        let cmd = Cmd::new("rsync").arg("-aHAX");
        assert_eq!(cmd.argv_as(false), vec!["rsync", "-aHAX"]);
    }

    #[test]
    fn display_quotes_args_with_spaces() {
        let cmd = Cmd::new("sqlite3").arg("/tmp/my db.sqlite").arg("VACUUM;");
        let shown = cmd.display();
        assert!(shown.contains("'/tmp/my db.sqlite'"));
        assert!(shown.contains("'VACUUM;'"));
    }

    #[test]
    fn display_leaves_plain_args_unquoted() {
        let cmd = Cmd::new("systemctl").args(["disable", "--now", "cups.service"]);
        assert_eq!(cmd.display(), "systemctl disable --now cups.service");
    }

    #[test]
    fn output_captures_stdout_and_code() {
        let out = Cmd::new("sh").args(["-c", "echo hello"]).output().unwrap();
        assert_eq!(out.code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn output_reports_nonzero_without_error() {
        let out = Cmd::new("sh").args(["-c", "exit 24"]).output().unwrap();
        assert_eq!(out.code, 24);
        assert!(!out.success());
    }

    #[test]
    fn output_checked_fails_on_nonzero() {
        let err = Cmd::new("sh")
            .args(["-c", "echo bad >&2; exit 3"])
            .output_checked()
            .unwrap_err();
        match err {
            OpsError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert!(stderr.contains("bad"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn run_checked_fails_on_nonzero() {
        let err = Cmd::new("sh").args(["-c", "exit 2"]).run_checked().unwrap_err();
        assert!(matches!(err, OpsError::CommandFailed { code: 2, .. }));
    }

    #[test]
    fn stdin_is_fed_to_the_command() {
        let out = Cmd::new("cat").with_stdin("piped input").output().unwrap();
        assert_eq!(out.stdout, "piped input");
    }

    #[test]
    fn missing_binary_maps_to_command_missing() {
        let err = Cmd::new("opskit-test-no-such-binary").output().unwrap_err();
        assert!(matches!(err, OpsError::CommandMissing(name) if name == "opskit-test-no-such-binary"));
    }

    #[test]
    fn available_finds_sh() {
        assert!(available("sh"));
        assert!(!available("opskit-test-no-such-binary"));
    }

    #[test]
    fn require_missing_is_typed() {
        assert!(matches!(
            require("opskit-test-no-such-binary"),
            Err(OpsError::CommandMissing(_))
        ));
    }
}
