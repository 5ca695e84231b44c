use std::time::Duration;

use futures::StreamExt;
use tracing::debug;

use crate::stream::QueryStream;
use crate::types::{Message, QueryOptions, ResultMessage};
use crate::{DriverError, Result};

// ─── Run configuration ────────────────────────────────────────────────────

/// Everything needed for one complete query: the prompt, the CLI options,
/// and an optional wall-clock limit.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub prompt: String,
    pub opts: QueryOptions,
    /// Kill the subprocess and fail with [`DriverError::Timeout`] if the
    /// result message has not arrived within this window.
    pub timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_opts(mut self, opts: QueryOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ─── Run outcome ──────────────────────────────────────────────────────────

/// Summary of a completed query, extracted from the terminal result message.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Session id, used with `QueryOptions::resume` to continue the
    /// conversation in a follow-up query.
    pub session_id: String,
    /// Final text produced by the model, when the run succeeded.
    pub result_text: Option<String>,
    /// Whether the CLI reported the run as failed. Success subtype with
    /// `is_error: true` counts as failed.
    pub is_error: bool,
    pub num_turns: u32,
    pub duration_ms: u64,
    pub total_cost_usd: f64,
}

impl RunResult {
    fn from_message(msg: &ResultMessage) -> Self {
        Self {
            session_id: msg.session_id().to_string(),
            result_text: msg.result_text().map(str::to_string),
            is_error: msg.reports_error(),
            num_turns: msg.num_turns(),
            duration_ms: msg.duration_ms(),
            total_cost_usd: msg.total_cost_usd(),
        }
    }
}

// ─── Entry point ──────────────────────────────────────────────────────────

/// Run one query to completion, invoking `on_message` for every message as
/// it arrives (transcript logging, progress display).
///
/// Returns the summary from the terminal result message. A stream that ends
/// without one is an error: either the process already reported why (exit
/// code and stderr) or we report the truncation ourselves.
pub async fn run(config: RunConfig, on_message: impl FnMut(&Message)) -> Result<RunResult> {
    let stream = crate::query(config.prompt, config.opts);

    match config.timeout {
        None => collect_with(stream, on_message).await,
        Some(limit) => {
            // Dropping the stream on timeout closes the channel, which the
            // stream's background task turns into a kill of the subprocess.
            match tokio::time::timeout(limit, collect_with(stream, on_message)).await {
                Ok(res) => res,
                Err(_) => Err(DriverError::Timeout {
                    limit_secs: limit.as_secs(),
                }),
            }
        }
    }
}

/// Drain a stream to its terminal result message.
pub(crate) async fn collect_with(
    mut stream: QueryStream,
    mut on_message: impl FnMut(&Message),
) -> Result<RunResult> {
    while let Some(item) = stream.next().await {
        let msg = item?;
        on_message(&msg);
        if let Message::Result(result) = &msg {
            debug!(
                session_id = result.session_id(),
                num_turns = result.num_turns(),
                "query complete"
            );
            return Ok(RunResult::from_message(result));
        }
    }
    Err(DriverError::Process(
        "stream ended without a result message".to_string(),
    ))
}

// ─── Tests ────────────────────────────────────────────────────────────────
