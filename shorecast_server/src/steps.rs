//! The stages a run executes, in order: sync the work tree, refresh
//! stream URLs, render the page, publish. Dry runs execute every stage
//! except publish, so their output stays local to the work tree.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use shorecast_pipeline::config::SiteConfig;
use shorecast_pipeline::{git, render, streams};

use crate::metrics;

/// Everything a step needs to do its work.
pub struct StepContext {
    pub site: Arc<SiteConfig>,
    pub work_dir: PathBuf,
    pub http: reqwest::Client,
    pub dry_run: bool,
}

pub struct StepOutput {
    pub detail: String,
    pub published_commit: Option<String>,
}

impl StepOutput {
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            published_commit: None,
        }
    }
}

#[async_trait]
pub trait RunStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Steps that do not apply are recorded as skipped.
    fn applies(&self, ctx: &StepContext) -> bool {
        let _ = ctx;
        true
    }

    async fn run(&self, ctx: &StepContext) -> anyhow::Result<StepOutput>;
}

/// The full pipeline in execution order.
pub fn pipeline_steps() -> Vec<Box<dyn RunStep>> {
    vec![
        Box::new(SyncStep),
        Box::new(StreamsStep),
        Box::new(RenderStep),
        Box::new(PublishStep),
    ]
}

/// Fast-forwards the work tree so the run starts from the remote tip.
struct SyncStep;

#[async_trait]
impl RunStep for SyncStep {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn run(&self, ctx: &StepContext) -> anyhow::Result<StepOutput> {
        let detail = git::sync_work_tree(&ctx.work_dir).await;
        Ok(StepOutput::detail(detail))
    }
}

/// Re-resolves HLS stream URLs and saves the directory file.
struct StreamsStep;

#[async_trait]
impl RunStep for StreamsStep {
    fn name(&self) -> &'static str {
        "streams"
    }

    async fn run(&self, ctx: &StepContext) -> anyhow::Result<StepOutput> {
        let state_path = ctx.work_dir.join(&ctx.site.stream_state);
        let previous = streams::load_directory(&state_path)?;
        let (directory, report) = streams::resolve_all(&ctx.http, &ctx.site.cams, &previous).await;
        streams::save_directory(&state_path, &directory)?;
        metrics::streams_resolved(report.resolved.len(), report.failed.len());
        Ok(StepOutput::detail(report.summary()))
    }
}

/// Fetches forecast and buoy data and writes the page.
struct RenderStep;

#[async_trait]
impl RunStep for RenderStep {
    fn name(&self) -> &'static str {
        "render"
    }

    async fn run(&self, ctx: &StepContext) -> anyhow::Result<StepOutput> {
        let state_path = ctx.work_dir.join(&ctx.site.stream_state);
        let directory = streams::load_directory(&state_path)?;
        let data = render::gather(&ctx.http, &ctx.site, directory, Utc::now()).await;
        let rendered = render::render_to_file(&ctx.work_dir, &ctx.site, &data, Utc::now())?;
        Ok(StepOutput::detail(format!(
            "wrote {} ({} bytes)",
            rendered.path.display(),
            rendered.bytes
        )))
    }
}

/// Commits and pushes the work tree.
struct PublishStep;

#[async_trait]
impl RunStep for PublishStep {
    fn name(&self) -> &'static str {
        "publish"
    }

    fn applies(&self, ctx: &StepContext) -> bool {
        !ctx.dry_run
    }

    async fn run(&self, ctx: &StepContext) -> anyhow::Result<StepOutput> {
        let outcome = git::publish(&ctx.work_dir, &ctx.site.publish).await?;
        metrics::publish_outcome(outcome.pushed);
        Ok(StepOutput {
            detail: outcome.summary(),
            published_commit: outcome.commit,
        })
    }
}
