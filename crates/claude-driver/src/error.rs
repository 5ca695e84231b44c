use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse stream-json line: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("claude process error: {0}")]
    Process(String),

    #[error("claude did not finish within {limit_secs}s")]
    Timeout { limit_secs: u64 },
}
