use crate::output;
use anyhow::{Context, Result};
use opskit_core::config::Config;
use opskit_core::maintain::{self, Task, TaskStatus};
use opskit_core::OpsError;

pub fn parse_task(s: &str) -> Result<Task, OpsError> {
    s.parse()
}

pub fn run(dry_run: bool, skip: &[Task], json: bool) -> Result<()> {
    let config = Config::load().context("failed to load config")?;
    let plans = maintain::plan_all(&config.maintain, skip)?;

    if dry_run {
        if json {
            let listing: Vec<serde_json::Value> = plans
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "task": p.task.as_str(),
                        "commands": p.cmds.iter().map(|c| c.display()).collect::<Vec<_>>(),
                        "skip_reason": p.skip_reason,
                    })
                })
                .collect();
            return output::print_json(&listing);
        }
        for plan in &plans {
            match &plan.skip_reason {
                Some(reason) => println!("# {}: skipped ({reason})", plan.task),
                None => {
                    for cmd in &plan.cmds {
                        println!("{}", cmd.display());
                    }
                }
            }
        }
        return Ok(());
    }

    let outcomes: Vec<_> = plans.iter().map(maintain::execute).collect();

    if json {
        output::print_json(&outcomes)?;
    } else {
        let rows = outcomes
            .iter()
            .map(|o| {
                let status = match o.status {
                    TaskStatus::Ran => "ran",
                    TaskStatus::Skipped => "skipped",
                    TaskStatus::Failed => "failed",
                };
                vec![
                    o.task.to_string(),
                    status.to_string(),
                    format!("{:.1}s", o.duration_ms as f64 / 1000.0),
                    o.detail.clone(),
                ]
            })
            .collect();
        output::print_table(&["TASK", "STATUS", "DURATION", "DETAIL"], rows);
    }

    let failed = outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} maintenance task(s) failed");
    }
    Ok(())
}
