use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("command not found on PATH: {0}")]
    CommandMissing(String),

    #[error("command failed with exit code {code}: {cmd}{stderr}")]
    CommandFailed {
        cmd: String,
        code: i32,
        /// Pre-formatted stderr tail, empty or "\n<text>".
        stderr: String,
    },

    #[error("command terminated by signal: {0}")]
    CommandKilled(String),

    #[error("unknown step '{0}': expected review, refactor, optimize, document or test")]
    UnknownStep(String),

    #[error("unknown task '{0}': expected apt, journal, docker or sqlite")]
    UnknownTask(String),

    #[error("source does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("destination parent does not exist: {0}")]
    DestinationParentMissing(PathBuf),

    #[error("marker file not found: {0} (destination volume not mounted?)")]
    MarkerMissing(PathBuf),

    #[error("invalid key source '{0}': expected a literal, env:VAR or file:PATH")]
    InvalidKeySource(String),

    #[error("environment variable not set: {0}")]
    EnvVarMissing(String),

    #[error("file is empty: {0}")]
    EmptyFile(PathBuf),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, OpsError>;
