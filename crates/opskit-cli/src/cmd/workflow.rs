use crate::output;
use crate::root;
use anyhow::{Context, Result};
use chrono::Utc;
use claude_driver::{runner, Message, PermissionMode, QueryOptions, RunConfig};
use opskit_core::config::Config;
use opskit_core::workflow::{self, Checkpoint, Step, StepRecord, StepStatus};
use opskit_core::{io, paths, OpsError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum WorkflowSubcommand {
    /// Run the step sequence against a project.
    ///
    /// Each step fires a headless claude subprocess over the project
    /// directory and waits for its terminal result. Steps already recorded
    /// as done are skipped; later steps resume the same claude session so
    /// the model keeps its context across the sequence.
    Run {
        /// Project directory (default: auto-detect from .opskit/ or .git/)
        path: Option<PathBuf>,

        /// Start from this step
        #[arg(long, value_parser = parse_step)]
        from: Option<Step>,

        /// Run exactly one step
        #[arg(long, value_parser = parse_step, conflicts_with = "from")]
        only: Option<Step>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Retries per failed step
        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-attempt timeout in seconds
        #[arg(long)]
        step_timeout: Option<u64>,

        /// Clear the checkpoint and session before running
        #[arg(long)]
        fresh: bool,

        /// Claude executable override
        #[arg(long, env = "OPSKIT_CLAUDE_BIN")]
        claude_bin: Option<String>,
    },

    /// Show the checkpoint: per-step state, attempts, cost
    Status {
        /// Project directory (default: auto-detect)
        path: Option<PathBuf>,
    },

    /// Clear the checkpoint, or a single step's record
    Reset {
        /// Project directory (default: auto-detect)
        path: Option<PathBuf>,

        /// Clear only this step
        #[arg(long, value_parser = parse_step)]
        step: Option<Step>,
    },
}

fn parse_step(s: &str) -> Result<Step, OpsError> {
    s.parse()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(subcommand: WorkflowSubcommand, json: bool) -> Result<()> {
    match subcommand {
        WorkflowSubcommand::Run {
            path,
            from,
            only,
            model,
            max_retries,
            step_timeout,
            fresh,
            claude_bin,
        } => cmd_run(
            path, from, only, model, max_retries, step_timeout, fresh, claude_bin, json,
        ),
        WorkflowSubcommand::Status { path } => cmd_status(path, json),
        WorkflowSubcommand::Reset { path, step } => cmd_reset(path, step),
    }
}

// ---------------------------------------------------------------------------
// workflow run
// ---------------------------------------------------------------------------

/// Everything one run needs, resolved from flags and config up front.
struct RunContext {
    dir: PathBuf,
    steps: Vec<Step>,
    model: Option<String>,
    allowed_tools: Vec<String>,
    prompts: HashMap<String, String>,
    max_retries: u32,
    step_timeout: Duration,
    retry_delay: Duration,
    claude_bin: Option<String>,
    log_path: PathBuf,
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    path: Option<PathBuf>,
    from: Option<Step>,
    only: Option<Step>,
    model: Option<String>,
    max_retries: Option<u32>,
    step_timeout: Option<u64>,
    fresh: bool,
    claude_bin: Option<String>,
    json: bool,
) -> Result<()> {
    let dir = root::resolve_project(path.as_deref());
    anyhow::ensure!(dir.is_dir(), "not a directory: {}", dir.display());

    // Fail before any spawn when the claude CLI is absent.
    let bin = claude_bin.clone().unwrap_or_else(|| "claude".to_string());
    which::which(&bin).with_context(|| {
        format!("claude executable '{bin}' not found (install the claude CLI or pass --claude-bin)")
    })?;

    let config = Config::load().context("failed to load config")?;
    for warning in config.validate() {
        match warning.level {
            opskit_core::config::WarnLevel::Error => anyhow::bail!("config: {}", warning.message),
            opskit_core::config::WarnLevel::Warning => tracing::warn!("config: {}", warning.message),
        }
    }
    let wf = config.workflow;

    let ctx = RunContext {
        steps: workflow::steps_to_run(from, only),
        model: model.or(wf.model),
        allowed_tools: wf.allowed_tools,
        prompts: wf.prompts,
        max_retries: max_retries.unwrap_or(wf.max_retries),
        step_timeout: Duration::from_secs(step_timeout.unwrap_or(wf.step_timeout_secs)),
        retry_delay: Duration::from_secs(wf.retry_delay_secs),
        claude_bin,
        log_path: paths::logs_dir(&dir).join(format!(
            "run-{}.jsonl",
            Utc::now().format("%Y%m%d-%H%M%S")
        )),
        dir,
    };

    if fresh && Checkpoint::delete(&ctx.dir)? {
        tracing::info!("cleared previous checkpoint");
    }
    let mut checkpoint = Checkpoint::load(&ctx.dir).context("failed to load checkpoint")?;

    // Keep workflow artifacts out of the project's version control.
    io::ensure_gitignore_entry(&ctx.dir, ".opskit/")?;

    let rt = tokio::runtime::Handle::try_current()
        .map(|_| None)
        .unwrap_or_else(|_| Some(tokio::runtime::Runtime::new().expect("tokio runtime")));

    let outcome = match rt {
        Some(rt) => rt.block_on(run_steps(&ctx, &mut checkpoint)),
        None => {
            // Already inside a runtime (e.g., integration test)
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(run_steps(&ctx, &mut checkpoint))
            })
        }
    };
    outcome?;

    if json {
        return output::print_json(&checkpoint);
    }
    println!(
        "\nWorkflow complete: {}/{} steps done. Total cost: ${:.4}",
        checkpoint.done_count(),
        Step::ALL.len(),
        checkpoint.total_cost_usd()
    );
    Ok(())
}

async fn run_steps(ctx: &RunContext, checkpoint: &mut Checkpoint) -> Result<()> {
    for &step in &ctx.steps {
        if checkpoint.is_done(step) {
            println!("step {step}: already done, skipping");
            continue;
        }
        run_step(ctx, checkpoint, step).await?;
    }
    Ok(())
}

/// Run one step to a recorded outcome, retrying failed attempts. Returns
/// `Err` only when every attempt failed; the checkpoint is saved after each
/// attempt either way.
async fn run_step(ctx: &RunContext, checkpoint: &mut Checkpoint, step: Step) -> Result<()> {
    let prompt = workflow::prompt_for(step, &ctx.prompts);
    let had_prior_record = checkpoint.step(step).is_some();
    let total_attempts = ctx.max_retries + 1;
    let mut step_cost = 0.0_f64;
    let mut last_error = String::new();

    for attempt in 1..=total_attempts {
        println!("step {step}: attempt {attempt}/{total_attempts}");
        log_attempt_header(&ctx.log_path, step, attempt)?;

        let opts = QueryOptions {
            model: ctx.model.clone(),
            allowed_tools: ctx.allowed_tools.clone(),
            permission_mode: PermissionMode::DontAsk,
            resume: checkpoint.session_id.clone(),
            cwd: Some(ctx.dir.clone()),
            path_to_executable: ctx.claude_bin.clone(),
            ..Default::default()
        };
        let run_cfg = RunConfig::new(prompt.clone())
            .with_opts(opts)
            .with_timeout(ctx.step_timeout);

        let started = Instant::now();
        let mut transcript: Vec<String> = Vec::new();
        let outcome = runner::run(run_cfg, |msg: &Message| {
            if let Ok(line) = serde_json::to_string(msg) {
                transcript.push(line);
            }
        })
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !transcript.is_empty() {
            io::append_text(&ctx.log_path, &format!("{}\n", transcript.join("\n")))?;
        }

        match outcome {
            Ok(result) => {
                step_cost += result.total_cost_usd;
                if !result.is_error {
                    let report =
                        write_report(&ctx.dir, step, result.result_text.as_deref(), had_prior_record)?;
                    checkpoint.record_step(
                        step,
                        StepRecord {
                            status: StepStatus::Done,
                            attempts: attempt,
                            duration_ms,
                            cost_usd: step_cost,
                            session_id: Some(result.session_id),
                            finished_at: Utc::now(),
                            error: None,
                        },
                    );
                    checkpoint.save(&ctx.dir)?;
                    println!(
                        "step {step}: done ({:.1}s, ${:.4})",
                        duration_ms as f64 / 1000.0,
                        step_cost
                    );
                    if let Some(path) = report {
                        println!("step {step}: report saved to {}", path.display());
                    }
                    return Ok(());
                }
                last_error = format!(
                    "claude reported an error result after {} turns",
                    result.num_turns
                );
                checkpoint.record_step(
                    step,
                    StepRecord {
                        status: StepStatus::Failed,
                        attempts: attempt,
                        duration_ms,
                        cost_usd: step_cost,
                        session_id: Some(result.session_id),
                        finished_at: Utc::now(),
                        error: Some(last_error.clone()),
                    },
                );
            }
            Err(e) => {
                last_error = e.to_string();
                checkpoint.record_step(
                    step,
                    StepRecord {
                        status: StepStatus::Failed,
                        attempts: attempt,
                        duration_ms,
                        cost_usd: step_cost,
                        session_id: None,
                        finished_at: Utc::now(),
                        error: Some(last_error.clone()),
                    },
                );
            }
        }
        checkpoint.save(&ctx.dir)?;

        if attempt < total_attempts {
            tracing::warn!(step = %step, "attempt {attempt} failed: {last_error}");
            println!(
                "step {step}: attempt failed, retrying in {}s",
                ctx.retry_delay.as_secs()
            );
            tokio::time::sleep(ctx.retry_delay).await;
        }
    }

    anyhow::bail!("step '{step}' failed after {total_attempts} attempt(s): {last_error}")
}

/// Marker line so the per-run transcript can be split by step and attempt.
fn log_attempt_header(log_path: &Path, step: Step, attempt: u32) -> Result<()> {
    let line = serde_json::json!({
        "type": "attempt",
        "step": step.as_str(),
        "attempt": attempt,
        "ts": Utc::now().to_rfc3339(),
    });
    io::append_text(log_path, &format!("{line}\n"))?;
    Ok(())
}

/// Save the step's final result text under `.opskit/reports/`. An existing
/// report from an earlier checkpoint gets a `_1`/`_2` suffix instead of
/// being overwritten.
fn write_report(
    dir: &Path,
    step: Step,
    text: Option<&str>,
    had_prior_record: bool,
) -> Result<Option<PathBuf>> {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };
    let mut path = paths::report_path(dir, step.as_str());
    if path.exists() && !had_prior_record {
        path = io::unique_path(&path);
    }
    io::atomic_write(&path, text.as_bytes())?;
    Ok(Some(path))
}

// ---------------------------------------------------------------------------
// workflow status
// ---------------------------------------------------------------------------

fn cmd_status(path: Option<PathBuf>, json: bool) -> Result<()> {
    let dir = root::resolve_project(path.as_deref());
    if !paths::workflow_path(&dir).exists() {
        if json {
            return output::print_json(&serde_json::json!({ "checkpoint": null }));
        }
        println!("No workflow checkpoint under {}", dir.display());
        return Ok(());
    }

    let checkpoint = Checkpoint::load(&dir).context("failed to load checkpoint")?;
    if json {
        return output::print_json(&checkpoint);
    }

    println!("Project: {}", dir.display());
    println!(
        "Run {} (updated {})",
        checkpoint.run_id,
        checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(session) = &checkpoint.session_id {
        println!("Session: {session}");
    }
    println!();

    let rows: Vec<Vec<String>> = Step::ALL
        .iter()
        .map(|step| match checkpoint.step(*step) {
            Some(r) => vec![
                step.to_string(),
                match r.status {
                    StepStatus::Done => "done".to_string(),
                    StepStatus::Failed => "failed".to_string(),
                },
                r.attempts.to_string(),
                format!("{:.1}s", r.duration_ms as f64 / 1000.0),
                format!("${:.4}", r.cost_usd),
                r.finished_at.format("%Y-%m-%d %H:%M").to_string(),
            ],
            None => vec![
                step.to_string(),
                "pending".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ],
        })
        .collect();
    output::print_table(
        &["STEP", "STATUS", "ATTEMPTS", "DURATION", "COST", "FINISHED"],
        rows,
    );
    println!("\nTotal cost: ${:.4}", checkpoint.total_cost_usd());
    Ok(())
}

// ---------------------------------------------------------------------------
// workflow reset
// ---------------------------------------------------------------------------

fn cmd_reset(path: Option<PathBuf>, step: Option<Step>) -> Result<()> {
    let dir = root::resolve_project(path.as_deref());
    match step {
        Some(step) => {
            let mut checkpoint = Checkpoint::load(&dir).context("failed to load checkpoint")?;
            if checkpoint.clear_step(step) {
                checkpoint.save(&dir)?;
                println!("Cleared step '{step}'.");
            } else {
                println!("Step '{step}' has no recorded state.");
            }
        }
        None => {
            if Checkpoint::delete(&dir)? {
                println!("Checkpoint removed.");
            } else {
                println!("No checkpoint to remove.");
            }
        }
    }
    Ok(())
}
