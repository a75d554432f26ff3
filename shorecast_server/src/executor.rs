//! Run executor, a background task that polls for pending runs and
//! drives them through the pipeline steps one at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use shorecast_pipeline::config::SiteConfig;

use crate::metrics;
use crate::models::{Run, RunStatus, StepStatus};
use crate::steps::{pipeline_steps, RunStep, StepContext};
use crate::store::RunStore;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct ExecutorContext {
    pub site: Arc<SiteConfig>,
    pub work_dir: PathBuf,
    pub http: reqwest::Client,
    pub step_timeout: Duration,
}

/// Run the executor loop forever. Spawned as a background tokio task.
pub async fn run_executor(store: Arc<RunStore>, ctx: ExecutorContext) {
    info!(
        work_dir = %ctx.work_dir.display(),
        step_timeout_secs = ctx.step_timeout.as_secs(),
        "Run executor started"
    );

    let steps = pipeline_steps();
    loop {
        if let Some(run) = store.claim_next_pending().await {
            metrics::run_status_changed("running");
            execute_run(&store, &ctx, &steps, &run).await;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Executes every step of one run and records the terminal status.
async fn execute_run(
    store: &RunStore,
    ctx: &ExecutorContext,
    steps: &[Box<dyn RunStep>],
    run: &Run,
) {
    info!(
        run_id = run.id,
        trigger = %run.trigger_event,
        dry_run = run.dry_run,
        "Executing run"
    );
    let run_start = Instant::now();
    let step_ctx = StepContext {
        site: Arc::clone(&ctx.site),
        work_dir: ctx.work_dir.clone(),
        http: ctx.http.clone(),
        dry_run: run.dry_run,
    };

    let mut failed: Option<String> = None;
    let mut published_commit = None;

    for step in steps {
        let sequence = store.start_step(run.id, step.name()).await;

        if failed.is_some() {
            store
                .complete_step(
                    run.id,
                    sequence,
                    StepStatus::Skipped,
                    Some("Skipped (previous step failed)".to_string()),
                )
                .await;
            continue;
        }
        if !step.applies(&step_ctx) {
            store
                .complete_step(
                    run.id,
                    sequence,
                    StepStatus::Skipped,
                    Some("Skipped (dry run)".to_string()),
                )
                .await;
            continue;
        }

        info!(run_id = run.id, step = step.name(), "Running step");
        let step_start = Instant::now();
        let result = tokio::time::timeout(ctx.step_timeout, step.run(&step_ctx)).await;
        let duration_ms = step_start.elapsed().as_millis() as u64;
        metrics::step_duration(step.name(), duration_ms);

        match result {
            Ok(Ok(output)) => {
                if output.published_commit.is_some() {
                    published_commit = output.published_commit;
                }
                let detail = if output.detail.is_empty() {
                    None
                } else {
                    Some(output.detail)
                };
                store
                    .complete_step(run.id, sequence, StepStatus::Success, detail)
                    .await;
                info!(
                    run_id = run.id,
                    step = step.name(),
                    duration_ms,
                    "Step passed"
                );
            }
            Ok(Err(e)) => {
                let detail = format!("{e:#}");
                warn!(
                    run_id = run.id,
                    step = step.name(),
                    error = %detail,
                    "Step failed"
                );
                store
                    .complete_step(run.id, sequence, StepStatus::Failure, Some(detail.clone()))
                    .await;
                failed = Some(format!("{}: {detail}", step.name()));
            }
            Err(_) => {
                let detail = format!("Step timed out after {}s", ctx.step_timeout.as_secs());
                warn!(run_id = run.id, step = step.name(), "{detail}");
                store
                    .complete_step(run.id, sequence, StepStatus::Failure, Some(detail.clone()))
                    .await;
                failed = Some(format!("{}: {detail}", step.name()));
            }
        }
    }

    let status = if failed.is_none() {
        RunStatus::Success
    } else {
        RunStatus::Failure
    };
    let duration_ms = run_start.elapsed().as_millis() as u64;
    store
        .finish_run(run.id, status, published_commit, failed)
        .await;
    metrics::run_status_changed(status.as_str());
    metrics::run_duration(duration_ms);
    info!(
        run_id = run.id,
        status = status.as_str(),
        duration_ms,
        "Run finished"
    );
}
