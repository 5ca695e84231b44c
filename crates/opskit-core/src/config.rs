use crate::error::Result;
use crate::mirror::MirrorJob;
use crate::workflow::Step;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WorkflowConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Claude model name; `None` = CLI default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Retries after a failed attempt (0 = single attempt).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Wall-clock limit per claude attempt.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Per-step prompt overrides, keyed by step name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub prompts: HashMap<String, String>,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    5
}

fn default_step_timeout() -> u64 {
    1800
}

fn default_allowed_tools() -> Vec<String> {
    ["Read", "Write", "Edit", "Bash", "Glob", "Grep"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            step_timeout_secs: default_step_timeout(),
            allowed_tools: default_allowed_tools(),
            prompts: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// MaintainConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintainConfig {
    /// Size cap handed to `journalctl --vacuum-size`.
    #[serde(default = "default_vacuum_size")]
    pub journal_vacuum_size: String,
    /// Globs of sqlite databases to VACUUM (tilde-expanded).
    #[serde(default = "default_sqlite_globs")]
    pub sqlite_globs: Vec<String>,
}

fn default_vacuum_size() -> String {
    "200M".to_string()
}

fn default_sqlite_globs() -> Vec<String> {
    vec!["~/.mozilla/firefox/*/*.sqlite".to_string()]
}

impl Default for MaintainConfig {
    fn default() -> Self {
        Self {
            journal_vacuum_size: default_vacuum_size(),
            sqlite_globs: default_sqlite_globs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level, ~/.config/opskit/config.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub maintain: MaintainConfig,
    /// Named mirror presets: `opskit mirror --job NAME`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub mirror: HashMap<String, MirrorJob>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            workflow: WorkflowConfig::default(),
            maintain: MaintainConfig::default(),
            mirror: HashMap::new(),
        }
    }
}

impl Config {
    /// Load the global config; a missing file yields the built-in defaults.
    pub fn load() -> Result<Self> {
        let path = crate::paths::global_config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn job(&self, name: &str) -> Option<&MirrorJob> {
        self.mirror.get(name)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for key in self.workflow.prompts.keys() {
            if Step::from_str(key).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown step '{key}' in workflow.prompts"),
                });
            }
        }

        if self.workflow.step_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "workflow.step_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.workflow.max_retries > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "workflow.max_retries is {}: every failed step will spawn that many claude runs",
                    self.workflow.max_retries
                ),
            });
        }

        for (name, job) in &self.mirror {
            if job.source.is_empty() || job.dest.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("mirror job '{name}' must set both source and dest"),
                });
            }
            if let Some(marker) = &job.marker {
                if marker.contains('/') {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "mirror job '{name}': marker should be a plain filename, got '{marker}'"
                        ),
                    });
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
