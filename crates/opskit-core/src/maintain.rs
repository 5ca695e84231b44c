//! Routine cleanup tasks. Each task delegates to one external tool and is
//! skipped, not failed, when that tool is absent.

use crate::config::MaintainConfig;
use crate::error::{OpsError, Result};
use crate::exec::{self, Cmd};
use crate::paths;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Apt,
    Journal,
    Docker,
    Sqlite,
}

impl Task {
    pub const ALL: [Task; 4] = [Task::Apt, Task::Journal, Task::Docker, Task::Sqlite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Apt => "apt",
            Task::Journal => "journal",
            Task::Docker => "docker",
            Task::Sqlite => "sqlite",
        }
    }

    /// The external binary this task delegates to.
    pub fn binary(&self) -> &'static str {
        match self {
            Task::Apt => "apt-get",
            Task::Journal => "journalctl",
            Task::Docker => "docker",
            Task::Sqlite => "sqlite3",
        }
    }
}

impl FromStr for Task {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "apt" => Ok(Task::Apt),
            "journal" => Ok(Task::Journal),
            "docker" => Ok(Task::Docker),
            "sqlite" => Ok(Task::Sqlite),
            other => Err(OpsError::UnknownTask(other.to_string())),
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// What one task will do, or why it won't.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub task: Task,
    pub cmds: Vec<Cmd>,
    pub summary: String,
    pub skip_reason: Option<String>,
}

/// Build the plan for one task against the live system (tool availability,
/// glob expansion).
pub fn plan(task: Task, cfg: &MaintainConfig) -> Result<TaskPlan> {
    if !exec::available(task.binary()) {
        return Ok(skip(task, format!("{} not found", task.binary())));
    }
    let sqlite_files = if task == Task::Sqlite {
        expand_globs(&cfg.sqlite_globs)?
    } else {
        Vec::new()
    };
    Ok(plan_with(task, cfg, &sqlite_files))
}

pub fn plan_all(cfg: &MaintainConfig, skip_tasks: &[Task]) -> Result<Vec<TaskPlan>> {
    Task::ALL
        .iter()
        .filter(|t| !skip_tasks.contains(t))
        .map(|t| plan(*t, cfg))
        .collect()
}

/// The pure part of planning: the tool is assumed present and sqlite globs
/// are already expanded.
fn plan_with(task: Task, cfg: &MaintainConfig, sqlite_files: &[PathBuf]) -> TaskPlan {
    match task {
        Task::Apt => TaskPlan {
            task,
            cmds: vec![
                Cmd::new("apt-get").args(["autoremove", "-y"]).needs_root(),
                Cmd::new("apt-get").arg("autoclean").needs_root(),
            ],
            summary: "autoremove + autoclean".to_string(),
            skip_reason: None,
        },
        Task::Journal => TaskPlan {
            task,
            cmds: vec![Cmd::new("journalctl")
                .arg(format!("--vacuum-size={}", cfg.journal_vacuum_size))
                .needs_root()],
            summary: format!("vacuum journal to {}", cfg.journal_vacuum_size),
            skip_reason: None,
        },
        Task::Docker => TaskPlan {
            task,
            cmds: vec![Cmd::new("docker").args(["system", "prune", "-f"])],
            summary: "prune unused docker data".to_string(),
            skip_reason: None,
        },
        Task::Sqlite => {
            if sqlite_files.is_empty() {
                return skip(task, "no databases matched the configured globs".to_string());
            }
            TaskPlan {
                task,
                cmds: sqlite_files
                    .iter()
                    .map(|f| {
                        Cmd::new("sqlite3")
                            .arg(f.to_string_lossy().into_owned())
                            .arg("VACUUM;")
                    })
                    .collect(),
                summary: format!("vacuum {} database(s)", sqlite_files.len()),
                skip_reason: None,
            }
        }
    }
}

fn skip(task: Task, reason: String) -> TaskPlan {
    TaskPlan {
        task,
        cmds: Vec::new(),
        summary: String::new(),
        skip_reason: Some(reason),
    }
}

/// Expand tilde-prefixed glob patterns into matching files.
pub fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let expanded = match pattern.strip_prefix("~/") {
            Some(rest) => paths::home_dir()?.join(rest).to_string_lossy().into_owned(),
            None => pattern.clone(),
        };
        for entry in glob::glob(&expanded)? {
            let path = entry.map_err(|e| e.into_error())?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ran,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task: Task,
    pub status: TaskStatus,
    pub detail: String,
    pub duration_ms: u64,
}

/// Run a planned task to completion. Command failures land in the outcome
/// rather than propagating — the remaining tasks still run.
pub fn execute(plan: &TaskPlan) -> TaskOutcome {
    if let Some(reason) = &plan.skip_reason {
        return TaskOutcome {
            task: plan.task,
            status: TaskStatus::Skipped,
            detail: reason.clone(),
            duration_ms: 0,
        };
    }

    let start = Instant::now();
    for cmd in &plan.cmds {
        if let Err(e) = cmd.run_checked() {
            return TaskOutcome {
                task: plan.task,
                status: TaskStatus::Failed,
                detail: e.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }
    }

    TaskOutcome {
        task: plan.task,
        status: TaskStatus::Ran,
        detail: plan.summary.clone(),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaintainConfig;
    use tempfile::TempDir;

    #[test]
    fn task_names_round_trip() {
        for task in Task::ALL {
            assert_eq!(task.as_str().parse::<Task>().unwrap(), task);
        }
        assert!(matches!(
            "firefox".parse::<Task>(),
            Err(OpsError::UnknownTask(_))
        ));
    }

    #[test]
    fn apt_plan_runs_autoremove_then_autoclean() {
        let plan = plan_with(Task::Apt, &MaintainConfig::default(), &[]);
        assert_eq!(plan.cmds.len(), 2);
        assert_eq!(
            plan.cmds[0].argv_as(true),
            vec!["apt-get", "autoremove", "-y"]
        );
        assert_eq!(plan.cmds[1].argv_as(true), vec!["apt-get", "autoclean"]);
    }

    #[test]
    fn journal_plan_uses_configured_size() {
        let cfg = MaintainConfig {
            journal_vacuum_size: "500M".into(),
            ..MaintainConfig::default()
        };
        let plan = plan_with(Task::Journal, &cfg, &[]);
        assert_eq!(
            plan.cmds[0].argv_as(true),
            vec!["journalctl", "--vacuum-size=500M"]
        );
    }

    #[test]
    fn docker_plan_does_not_use_sudo() {
        let plan = plan_with(Task::Docker, &MaintainConfig::default(), &[]);
        assert_eq!(
            plan.cmds[0].argv_as(false),
            vec!["docker", "system", "prune", "-f"]
        );
    }

    #[test]
    fn sqlite_plan_vacuums_each_file() {
        let files = vec![PathBuf::from("/tmp/a.sqlite"), PathBuf::from("/tmp/b.sqlite")];
        let plan = plan_with(Task::Sqlite, &MaintainConfig::default(), &files);
        assert_eq!(plan.cmds.len(), 2);
        assert_eq!(
            plan.cmds[0].argv_as(true),
            vec!["sqlite3", "/tmp/a.sqlite", "VACUUM;"]
        );
    }

    #[test]
    fn sqlite_plan_skips_when_nothing_matches() {
        let plan = plan_with(Task::Sqlite, &MaintainConfig::default(), &[]);
        assert!(plan.skip_reason.is_some());
        assert!(plan.cmds.is_empty());
    }

    #[test]
    fn expand_globs_matches_nested_files() {
        let dir = TempDir::new().unwrap();
        let profile = dir.path().join("abcd.default");
        std::fs::create_dir_all(&profile).unwrap();
        std::fs::write(profile.join("places.sqlite"), b"").unwrap();
        std::fs::write(profile.join("notes.txt"), b"").unwrap();

        let pattern = format!("{}/*/*.sqlite", dir.path().display());
        let files = expand_globs(&[pattern]).unwrap();
        assert_eq!(files, vec![profile.join("places.sqlite")]);
    }

    #[test]
    fn expand_globs_rejects_bad_pattern() {
        assert!(matches!(
            expand_globs(&["[".to_string()]),
            Err(OpsError::Glob(_))
        ));
    }

    #[test]
    fn execute_skip_runs_nothing() {
        let plan = skip(Task::Docker, "docker not found".into());
        let outcome = execute(&plan);
        assert_eq!(outcome.status, TaskStatus::Skipped);
        assert_eq!(outcome.detail, "docker not found");
    }

    #[test]
    fn execute_reports_ran_on_success() {
        let plan = TaskPlan {
            task: Task::Journal,
            cmds: vec![Cmd::new("sh").args(["-c", "exit 0"])],
            summary: "ok".into(),
            skip_reason: None,
        };
        let outcome = execute(&plan);
        assert_eq!(outcome.status, TaskStatus::Ran);
        assert_eq!(outcome.detail, "ok");
    }

    #[test]
    fn execute_reports_failed_on_nonzero_exit() {
        let plan = TaskPlan {
            task: Task::Apt,
            cmds: vec![Cmd::new("sh").args(["-c", "exit 1"])],
            summary: "ok".into(),
            skip_reason: None,
        };
        let outcome = execute(&plan);
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(outcome.detail.contains("exit code 1"));
    }

    #[test]
    fn plan_all_honors_skip_list() {
        let cfg = MaintainConfig {
            sqlite_globs: Vec::new(),
            ..MaintainConfig::default()
        };
        let plans = plan_all(&cfg, &[Task::Apt, Task::Docker]).unwrap();
        let tasks: Vec<Task> = plans.iter().map(|p| p.task).collect();
        assert_eq!(tasks, vec![Task::Journal, Task::Sqlite]);
    }
}
