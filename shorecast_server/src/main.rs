//! Shorecast daemon.
//!
//! Runs the surf-cam publication pipeline continuously: a schedule
//! trigger queues a run every interval, GitHub webhooks queue runs on
//! pushes and pull requests against the publish branch, and an executor
//! works through the queue one run at a time. The HTTP surface exposes
//! the run history, a manual trigger, health, and the generated page.

mod config;
mod executor;
mod health;
mod metrics;
mod models;
mod routes;
mod scheduler;
mod steps;
mod store;
mod webhook;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use shorecast_pipeline::config::SiteConfig;
use shorecast_pipeline::{git, http, SITE_FILE};

use crate::executor::ExecutorContext;
use crate::routes::AppState;
use crate::store::RunStore;

#[derive(Parser)]
#[command(name = "shorecast", about = "Surf cam page publication daemon")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "SHORECAST_PORT", default_value = "9190")]
    port: u16,

    /// Git work tree holding the site
    #[arg(long, env = "SHORECAST_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Site definition file, relative to the work tree
    #[arg(long, env = "SHORECAST_SITE", default_value = SITE_FILE)]
    site: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    tracing::info!("Starting Shorecast daemon...");

    let server_config = Arc::new(config::ServerConfig::from_env());
    let site_path = cli.work_dir.join(&cli.site);
    let (site, from_file) = SiteConfig::load_or_default(&site_path)?;
    if from_file {
        tracing::info!(path = %site_path.display(), "Loaded site definition");
    } else {
        tracing::info!("No site definition found, using stock definition");
    }
    let site = Arc::new(site);

    if site.publish.github_repo.is_some()
        && std::env::var(&site.publish.token_env).unwrap_or_default().is_empty()
    {
        tracing::warn!(
            "{} not set -- authenticated push disabled",
            site.publish.token_env
        );
    }
    if !git::is_repo(&cli.work_dir).await {
        tracing::warn!(
            work_dir = %cli.work_dir.display(),
            "Work tree is not a git repository -- publish runs will fail"
        );
    }

    let http = http::client()?;
    let store = Arc::new(RunStore::new(
        server_config.throttle_window_secs,
        server_config.history_limit,
    ));

    // Background tasks: the run executor and the schedule trigger.
    tokio::spawn(executor::run_executor(
        Arc::clone(&store),
        ExecutorContext {
            site: Arc::clone(&site),
            work_dir: cli.work_dir.clone(),
            http: http.clone(),
            step_timeout: Duration::from_secs(server_config.step_timeout_secs),
        },
    ));
    tokio::spawn(scheduler::run_scheduler(
        Arc::clone(&store),
        site.publish.branch.clone(),
        Duration::from_secs(server_config.interval_secs),
    ));

    // Initialize metrics
    metrics::init_metrics();

    let app = routes::app_router(AppState {
        store,
        config: server_config,
        site,
        work_dir: cli.work_dir,
    });

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Shorecast daemon listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
