use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::types::{Message, PermissionMode, QueryOptions};
use crate::{DriverError, Result};

// ─── ClaudeProcess ────────────────────────────────────────────────────────

/// A running `claude --output-format stream-json --input-format stream-json`
/// subprocess.
///
/// The prompt is sent as a JSON user message on stdin, and responses are read
/// as JSONL from stdout. Stderr is captured by a background task and surfaced
/// on process exit errors.
pub(crate) struct ClaudeProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stdin: Option<ChildStdin>,
    /// Stderr output collected by a background reader task.
    stderr_buf: Arc<Mutex<String>>,
}

impl ClaudeProcess {
    /// Spawn the `claude` binary with the given prompt and options.
    ///
    /// After sending the prompt, stdin is closed for single-turn operation.
    ///
    /// `CLAUDECODE` is removed from the environment; the CLI refuses to
    /// start a nested session while it is set.
    pub(crate) async fn spawn(prompt: &str, opts: &QueryOptions) -> Result<Self> {
        let mut cmd = build_command(opts);
        cmd.env_remove("CLAUDECODE");

        for (k, v) in &opts.env {
            cmd.env(k, v);
        }

        let mut process = Self::from_command(cmd)?;

        let user_msg = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": prompt}]
            }
        });
        process.send_message(&user_msg).await?;
        process.close_stdin();

        Ok(process)
    }

    /// Spawn an arbitrary command as a stand-in Claude process.
    /// Used in unit tests to inject a command that emits fixed JSON lines.
    #[cfg(test)]
    pub(crate) fn spawn_command(cmd: Command) -> Result<Self> {
        Self::from_command(cmd)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(DriverError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Process("stdout not captured".into()))?;

        let stdin = child.stdin.take();

        // Drain stderr in the background so the pipe never fills up; the
        // buffer is attached to exit errors.
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        let lines = BufReader::new(stdout).lines();
        Ok(Self {
            child,
            lines,
            stdin,
            stderr_buf,
        })
    }

    /// Write a JSON message to the subprocess stdin.
    pub(crate) async fn send_message(&mut self, msg: &serde_json::Value) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DriverError::Process("stdin already closed".into()))?;

        let mut buf = serde_json::to_vec(msg)
            .map_err(|e| DriverError::Process(format!("failed to serialize stdin message: {e}")))?;
        buf.push(b'\n');

        stdin.write_all(&buf).await.map_err(DriverError::Io)?;
        stdin.flush().await.map_err(DriverError::Io)?;

        Ok(())
    }

    /// Close stdin, signalling no more input (single-turn mode).
    pub(crate) fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Read the next non-empty JSONL line from stdout and deserialize it.
    ///
    /// Lines that are valid JSON but carry a message type this crate does not
    /// model are silently skipped; the workflow must not break when the CLI
    /// adds new message kinds.
    ///
    /// Returns `Ok(None)` on EOF (process exited).
    pub(crate) async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            match self.lines.next_line().await {
                Err(e) => return Err(DriverError::Io(e)),
                Ok(None) => return Ok(None),
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Message>(trimmed) {
                        Ok(msg) => return Ok(Some(msg)),
                        Err(e) => {
                            if is_unknown_message_type(trimmed) {
                                continue;
                            }
                            return Err(DriverError::Parse {
                                line: trimmed.to_owned(),
                                source: e,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Wait for the child to exit and return an error if the exit code is
    /// non-zero or the process was killed by a signal. Captured stderr is
    /// included in the error message.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<DriverError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(DriverError::Io(e)),
        };

        if status.success() {
            return None;
        }

        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();

        let msg = if let Some(code) = status.code() {
            if stderr.is_empty() {
                format!("claude exited with code {code}")
            } else {
                format!("claude exited with code {code}\nstderr: {stderr}")
            }
        } else if stderr.is_empty() {
            "claude terminated by signal".to_string()
        } else {
            format!("claude terminated by signal\nstderr: {stderr}")
        };

        Some(DriverError::Process(msg))
    }

    /// Kill the subprocess (best-effort; errors are silently ignored).
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

/// Check whether a JSON line carries a `"type"` field with a value we don't
/// model. Valid JSON with a type field is an unknown message kind and should
/// be skipped; anything else is a genuine parse error.
fn is_unknown_message_type(line: &str) -> bool {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(line) {
        v.get("type").is_some()
    } else {
        false
    }
}

// ─── Command builder ──────────────────────────────────────────────────────

fn build_command(opts: &QueryOptions) -> Command {
    let exe = opts.path_to_executable.as_deref().unwrap_or("claude");
    let mut cmd = Command::new(exe);

    cmd.arg("--output-format")
        .arg("stream-json")
        .arg("--verbose")
        .arg("--input-format")
        .arg("stream-json");

    if let Some(model) = &opts.model {
        cmd.arg("--model").arg(model);
    }

    if let Some(max_turns) = opts.max_turns {
        cmd.arg("--max-turns").arg(max_turns.to_string());
    }

    if !opts.allowed_tools.is_empty() {
        cmd.arg("--allowed-tools").args(&opts.allowed_tools);
    }

    if opts.permission_mode != PermissionMode::Default {
        cmd.arg("--permission-mode")
            .arg(opts.permission_mode.as_str());
    }

    if let Some(append) = &opts.append_system_prompt {
        cmd.arg("--append-system-prompt").arg(append);
    }

    if let Some(resume) = &opts.resume {
        cmd.arg("--resume").arg(resume);
    }

    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }

    // The prompt is sent over stdin, never as a positional arg.

    cmd
}
