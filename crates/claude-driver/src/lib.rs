//! `claude-driver` — subprocess driver for the Claude CLI.
//!
//! opskit's workflow command runs `claude` headless and needs more than an
//! exit code: it must know whether the agent actually finished, what the final
//! text was, what it cost, and which session to resume for the next step. The
//! CLI exposes all of that through `--output-format stream-json`, and this
//! crate consumes that protocol as typed messages.
//!
//! # Architecture
//!
//! ```text
//! QueryOptions
//!     │
//!     ▼
//! ClaudeProcess   ← spawns `claude --output-format stream-json …`
//!     │              reads JSONL from stdout
//!     ▼
//! QueryStream     ← implements futures::Stream<Item = Result<Message>>
//!     │              background task + mpsc channel
//!     ▼
//! Message enum    ← typed system / assistant / user / result messages
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use claude_driver::{runner, QueryOptions};
//! use std::time::Duration;
//!
//! let config = runner::RunConfig {
//!     prompt: "Review this project for correctness issues.".into(),
//!     opts: QueryOptions {
//!         model: Some("claude-sonnet-4-6".into()),
//!         ..Default::default()
//!     },
//!     timeout: Some(Duration::from_secs(1800)),
//! };
//!
//! let result = runner::run(config, |_msg| {}).await?;
//! println!("{}", result.result_text.unwrap_or_default());
//! ```

pub mod error;
pub mod runner;
pub mod types;

pub(crate) mod process;
pub mod stream;


pub use error::DriverError;
pub use runner::{RunConfig, RunResult};
pub use stream::QueryStream;
pub use types::{
    AssistantContent, AssistantMessage, ContentBlock, Message, PermissionMode, QueryOptions,
    ResultError, ResultMessage, ResultSuccess, SystemMessage, SystemPayload, UserMessage,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Start a single headless query against the Claude CLI.
///
/// Returns a [`QueryStream`] that yields [`Message`] values as they arrive
/// from the subprocess. The stream terminates after the first
/// [`Message::Result`] or on process exit. Most callers want
/// [`runner::run`], which also applies a timeout and extracts the terminal
/// result.
pub fn query(prompt: impl Into<String>, opts: QueryOptions) -> QueryStream {
    QueryStream::new(prompt.into(), opts)
}
