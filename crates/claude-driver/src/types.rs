use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Outer Message enum ───────────────────────────────────────────────────

/// A message emitted by `claude --output-format stream-json`, discriminated
/// by the JSON `"type"` field.
///
/// Only the message types the workflow consumes are modelled. Anything else
/// the CLI emits (`stream_event`, `tool_progress`, rate-limit notices, future
/// additions) is skipped at the process layer rather than failing the stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    Result(ResultMessage),
}

impl Message {
    pub fn session_id(&self) -> &str {
        match self {
            Message::System(m) => &m.session_id,
            Message::Assistant(m) => &m.session_id,
            Message::User(m) => &m.session_id,
            Message::Result(m) => m.session_id(),
        }
    }

    /// Returns `Some(&ResultMessage)` if this is the terminal result message.
    pub fn as_result(&self) -> Option<&ResultMessage> {
        if let Message::Result(r) = self {
            Some(r)
        } else {
            None
        }
    }
}

// ─── System messages ──────────────────────────────────────────────────────

/// `type = "system"` — further distinguished by `subtype`.
///
/// Uses `#[serde(flatten)]` so the inner `SystemPayload` enum (tagged by
/// `subtype`) consumes the remaining fields after `session_id`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemMessage {
    pub session_id: String,
    #[serde(flatten)]
    pub payload: SystemPayload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SystemPayload {
    /// First message of every stream — carries model and session metadata.
    Init(SystemInit),
    /// Any future/unknown system subtype — safe to ignore.
    #[serde(other)]
    Unknown,
}

/// The `system/init` payload. Every field beyond `model` is defaulted: the
/// CLI has grown this message across releases and the workflow only needs
/// the session id (on the envelope) and the model name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemInit {
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Permission mode — the CLI sends camelCase (`permissionMode`).
    #[serde(default, alias = "permissionMode")]
    pub permission_mode: String,
    #[serde(default)]
    pub cwd: String,
}

// ─── Assistant messages ───────────────────────────────────────────────────

/// `type = "assistant"` — the model's response, including content blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    pub message: AssistantContent,
    pub session_id: String,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantContent {
    pub role: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: String,
}

/// Content blocks within an assistant message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Tool inputs are schema-polymorphic (vary per tool), so Value is correct here.
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
}

// ─── User messages ────────────────────────────────────────────────────────

/// `type = "user"` — tool results fed back to the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    pub message: UserContent,
    pub session_id: String,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserContent {
    pub role: String,
    #[serde(default)]
    pub content: Vec<UserContentBlock>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContentBlock {
    Text {
        text: String,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

// ─── Result messages ──────────────────────────────────────────────────────

/// `type = "result"` — the terminal message in every query stream.
///
/// `subtype` distinguishes success from the various error conditions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ResultMessage {
    Success(ResultSuccess),
    ErrorDuringExecution(ResultError),
    ErrorMaxTurns(ResultError),
    ErrorMaxBudgetUsd(ResultError),
    ErrorMaxStructuredOutputRetries(ResultError),
}

impl ResultMessage {
    pub fn session_id(&self) -> &str {
        match self {
            ResultMessage::Success(r) => &r.session_id,
            ResultMessage::ErrorDuringExecution(r)
            | ResultMessage::ErrorMaxTurns(r)
            | ResultMessage::ErrorMaxBudgetUsd(r)
            | ResultMessage::ErrorMaxStructuredOutputRetries(r) => &r.session_id,
        }
    }

    /// `true` unless this is a clean success: either an error subtype, or a
    /// `success` payload that still flags `is_error`. A workflow step counts
    /// as done only when this returns `false`.
    pub fn reports_error(&self) -> bool {
        match self {
            ResultMessage::Success(r) => r.is_error,
            _ => true,
        }
    }

    /// The final result text. `None` for error subtypes.
    pub fn result_text(&self) -> Option<&str> {
        if let ResultMessage::Success(r) = self {
            Some(&r.result)
        } else {
            None
        }
    }

    pub fn total_cost_usd(&self) -> f64 {
        match self {
            ResultMessage::Success(r) => r.total_cost_usd,
            ResultMessage::ErrorDuringExecution(r)
            | ResultMessage::ErrorMaxTurns(r)
            | ResultMessage::ErrorMaxBudgetUsd(r)
            | ResultMessage::ErrorMaxStructuredOutputRetries(r) => r.total_cost_usd,
        }
    }

    pub fn num_turns(&self) -> u32 {
        match self {
            ResultMessage::Success(r) => r.num_turns,
            ResultMessage::ErrorDuringExecution(r)
            | ResultMessage::ErrorMaxTurns(r)
            | ResultMessage::ErrorMaxBudgetUsd(r)
            | ResultMessage::ErrorMaxStructuredOutputRetries(r) => r.num_turns,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            ResultMessage::Success(r) => r.duration_ms,
            ResultMessage::ErrorDuringExecution(r)
            | ResultMessage::ErrorMaxTurns(r)
            | ResultMessage::ErrorMaxBudgetUsd(r)
            | ResultMessage::ErrorMaxStructuredOutputRetries(r) => r.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultSuccess {
    pub session_id: String,
    pub result: String,
    pub duration_ms: u64,
    pub is_error: bool,
    pub num_turns: u32,
    pub total_cost_usd: f64,
    #[serde(default)]
    pub usage: ResultUsage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultError {
    pub session_id: String,
    pub duration_ms: u64,
    pub is_error: bool,
    pub num_turns: u32,
    pub total_cost_usd: f64,
    #[serde(default)]
    pub usage: ResultUsage,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResultUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

// ─── QueryOptions ─────────────────────────────────────────────────────────

/// Options for driving a single Claude subprocess query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Claude model name (e.g. `"claude-sonnet-4-6"`); `None` = CLI default.
    pub model: Option<String>,
    /// Maximum number of agentic turns before the CLI stops with `error_max_turns`.
    pub max_turns: Option<u32>,
    /// Tool names that are auto-approved without prompting.
    pub allowed_tools: Vec<String>,
    /// Permission mode for tool execution.
    pub permission_mode: PermissionMode,
    /// Text appended to the CLI's default system prompt.
    pub append_system_prompt: Option<String>,
    /// Session ID to resume (loads conversation history).
    pub resume: Option<String>,
    /// Working directory for the subprocess (default: current dir).
    pub cwd: Option<std::path::PathBuf>,
    /// Additional environment variables for the subprocess.
    pub env: HashMap<String, String>,
    /// Custom path to the `claude` binary (default: `"claude"`).
    pub path_to_executable: Option<String>,
}

/// Permission mode — controls how tool executions are authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PermissionMode {
    /// Standard: prompts for dangerous operations.
    #[default]
    Default,
    /// Auto-accept file edit operations.
    AcceptEdits,
    /// Bypass all permission checks.
    BypassPermissions,
    /// Planning mode — no actual tool execution.
    Plan,
    /// Don't prompt; deny if not pre-approved.
    DontAsk,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
            PermissionMode::DontAsk => "dontAsk",
        }
    }
}
