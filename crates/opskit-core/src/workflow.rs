//! The five-step AI workflow: model, checkpoint file and prompt templates.
//!
//! The engine that spawns `claude` lives in the CLI crate; this module owns
//! everything that must survive between runs — the step order, the
//! `.opskit/workflow.yaml` checkpoint and the per-step prompts.

use crate::error::{OpsError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// The fixed workflow sequence. `--from`/`--only` select a suffix or a single
/// step but never reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Review,
    Refactor,
    Optimize,
    Document,
    Test,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Review,
        Step::Refactor,
        Step::Optimize,
        Step::Document,
        Step::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Review => "review",
            Step::Refactor => "refactor",
            Step::Optimize => "optimize",
            Step::Document => "document",
            Step::Test => "test",
        }
    }

    fn position(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }
}

impl FromStr for Step {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "review" => Ok(Step::Review),
            "refactor" => Ok(Step::Refactor),
            "optimize" => Ok(Step::Optimize),
            "document" => Ok(Step::Document),
            "test" => Ok(Step::Test),
            other => Err(OpsError::UnknownStep(other.to_string())),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The steps a run will visit, honoring `--from` and `--only`.
pub fn steps_to_run(from: Option<Step>, only: Option<Step>) -> Vec<Step> {
    if let Some(step) = only {
        return vec![step];
    }
    let start = from.map(|s| s.position()).unwrap_or(0);
    Step::ALL[start..].to_vec()
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Failed,
}

/// Outcome of the most recent run of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `.opskit/workflow.yaml` — progress of a workflow run over one project.
///
/// Written after every attempt so an interrupted run can resume. Steps
/// already `done` are skipped on the next `workflow run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_version")]
    pub version: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Claude session carried across steps via `--resume`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,
}

fn default_version() -> u32 {
    1
}

impl Checkpoint {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            updated_at: now,
            session_id: None,
            steps: BTreeMap::new(),
        }
    }

    /// Load the checkpoint for `root`; a missing file yields a fresh one.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::workflow_path(root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let cp: Checkpoint = serde_yaml::from_str(&data)?;
        Ok(cp)
    }

    pub fn save(&mut self, root: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::workflow_path(root), data.as_bytes())
    }

    /// Remove the checkpoint file. Returns true if one existed.
    pub fn delete(root: &Path) -> Result<bool> {
        let path = paths::workflow_path(root);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        Ok(true)
    }

    pub fn step(&self, step: Step) -> Option<&StepRecord> {
        self.steps.get(step.as_str())
    }

    pub fn is_done(&self, step: Step) -> bool {
        matches!(self.step(step), Some(r) if r.status == StepStatus::Done)
    }

    pub fn record_step(&mut self, step: Step, record: StepRecord) {
        if record.session_id.is_some() {
            self.session_id = record.session_id.clone();
        }
        self.steps.insert(step.as_str().to_string(), record);
    }

    /// Drop one step's record. Returns true if it was present.
    pub fn clear_step(&mut self, step: Step) -> bool {
        self.steps.remove(step.as_str()).is_some()
    }

    /// Cost accumulated across all recorded steps (failed attempts included).
    pub fn total_cost_usd(&self) -> f64 {
        self.steps.values().map(|r| r.cost_usd).sum()
    }

    pub fn done_count(&self) -> usize {
        Step::ALL.iter().filter(|s| self.is_done(**s)).count()
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// The prompt sent to claude for `step`: the config override when present,
/// otherwise the built-in template.
pub fn prompt_for(step: Step, overrides: &HashMap<String, String>) -> String {
    if let Some(custom) = overrides.get(step.as_str()) {
        return custom.clone();
    }
    default_prompt(step).to_string()
}

/// Built-in step prompts. Later steps run in the same claude session, so
/// they can refer back to earlier findings.
fn default_prompt(step: Step) -> &'static str {
    match step {
        Step::Review => {
            "Review this project's source code for correctness, security and \
             maintainability problems. Work through the tree systematically; do not \
             modify any files. Finish with a numbered list of concrete findings \
             ordered by severity, each naming the affected file."
        }
        Step::Refactor => {
            "Fix the findings from your review, highest severity first. Keep \
             behavior identical: no feature changes, no API breaks. Prefer small, \
             verifiable edits over rewrites. Summarize each change you made."
        }
        Step::Optimize => {
            "Look for clear performance problems: accidental quadratic loops, \
             repeated I/O that could be batched, needless allocations in hot paths. \
             Only change code where the win is obvious and behavior is preserved. \
             List every optimization with a one-line justification."
        }
        Step::Document => {
            "Bring the documentation up to date with the code as it now stands: \
             README usage, public API docs, setup steps. Document what exists — do \
             not invent planned features. Summarize what you added or corrected."
        }
        Step::Test => {
            "Strengthen the test suite around the code you changed in the earlier \
             steps, plus any load-bearing logic that lacks coverage. Run the \
             project's test command and make the suite pass. Report the final test \
             count and any tests you could not fix."
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn done_record() -> StepRecord {
        StepRecord {
            status: StepStatus::Done,
            attempts: 1,
            duration_ms: 1000,
            cost_usd: 0.05,
            session_id: Some("sess-1".into()),
            finished_at: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn step_order_is_fixed() {
        let names: Vec<&str> = Step::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["review", "refactor", "optimize", "document", "test"]
        );
    }

    #[test]
    fn steps_to_run_defaults_to_all() {
        assert_eq!(steps_to_run(None, None), Step::ALL.to_vec());
    }

    #[test]
    fn from_selects_a_suffix() {
        assert_eq!(
            steps_to_run(Some(Step::Optimize), None),
            vec![Step::Optimize, Step::Document, Step::Test]
        );
    }

    #[test]
    fn only_selects_a_single_step() {
        assert_eq!(steps_to_run(None, Some(Step::Document)), vec![Step::Document]);
        // only wins over from
        assert_eq!(
            steps_to_run(Some(Step::Review), Some(Step::Test)),
            vec![Step::Test]
        );
    }

    #[test]
    fn step_parses_from_str() {
        assert_eq!("review".parse::<Step>().unwrap(), Step::Review);
        assert_eq!("test".parse::<Step>().unwrap(), Step::Test);
        assert!(matches!(
            "deploy".parse::<Step>(),
            Err(OpsError::UnknownStep(s)) if s == "deploy"
        ));
    }

    #[test]
    fn fresh_checkpoint_has_no_steps() {
        let cp = Checkpoint::new();
        assert_eq!(cp.version, 1);
        assert!(cp.steps.is_empty());
        assert!(!cp.is_done(Step::Review));
        assert_eq!(cp.done_count(), 0);
    }

    #[test]
    fn load_missing_yields_fresh() {
        let dir = TempDir::new().unwrap();
        let cp = Checkpoint::load(dir.path()).unwrap();
        assert!(cp.steps.is_empty());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut cp = Checkpoint::new();
        cp.record_step(Step::Review, done_record());
        cp.save(dir.path()).unwrap();

        let loaded = Checkpoint::load(dir.path()).unwrap();
        assert_eq!(loaded.run_id, cp.run_id);
        assert!(loaded.is_done(Step::Review));
        assert!(!loaded.is_done(Step::Refactor));
        assert_eq!(loaded.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn record_step_carries_session_forward() {
        let mut cp = Checkpoint::new();
        cp.record_step(Step::Review, done_record());
        assert_eq!(cp.session_id.as_deref(), Some("sess-1"));

        // A record without a session id keeps the previous one
        let mut failed = done_record();
        failed.status = StepStatus::Failed;
        failed.session_id = None;
        cp.record_step(Step::Refactor, failed);
        assert_eq!(cp.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn total_cost_sums_all_steps() {
        let mut cp = Checkpoint::new();
        cp.record_step(Step::Review, done_record());
        let mut second = done_record();
        second.cost_usd = 0.15;
        cp.record_step(Step::Refactor, second);
        assert!((cp.total_cost_usd() - 0.20).abs() < 1e-9);
    }

    #[test]
    fn clear_step_removes_record() {
        let mut cp = Checkpoint::new();
        cp.record_step(Step::Review, done_record());
        assert!(cp.clear_step(Step::Review));
        assert!(!cp.clear_step(Step::Review));
        assert!(!cp.is_done(Step::Review));
    }

    #[test]
    fn delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let mut cp = Checkpoint::new();
        cp.save(dir.path()).unwrap();
        assert!(Checkpoint::delete(dir.path()).unwrap());
        assert!(!Checkpoint::delete(dir.path()).unwrap());
    }

    #[test]
    fn prompt_override_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("review".to_string(), "custom review prompt".to_string());
        assert_eq!(prompt_for(Step::Review, &overrides), "custom review prompt");
        // Non-overridden steps fall back to the template
        assert!(prompt_for(Step::Test, &overrides).contains("test"));
    }

    #[test]
    fn default_prompts_are_distinct() {
        let prompts: Vec<&str> = Step::ALL.iter().map(|s| default_prompt(*s)).collect();
        for (i, a) in prompts.iter().enumerate() {
            for b in prompts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
