//! HTTP surface of the daemon: GitHub webhook, run API, health, and the
//! published page itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeFile;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use shorecast_pipeline::config::SiteConfig;

use crate::config::ServerConfig;
use crate::health;
use crate::models::{NewRun, Run};
use crate::store::{EnqueueOutcome, RunStats, RunStore};
use crate::webhook;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RunStore>,
    pub config: Arc<ServerConfig>,
    pub site: Arc<SiteConfig>,
    pub work_dir: PathBuf,
}

/// Build the daemon's Axum router.
pub fn app_router(state: AppState) -> Router {
    let page = ServeFile::new(state.work_dir.join(&state.site.output));
    Router::new()
        // Webhook
        .route("/hooks/github", post(webhook_handler))
        // Run API
        .route("/api/runs", get(list_runs_handler))
        .route("/api/runs/trigger", post(trigger_run_handler))
        .route("/api/runs/{run_id}", get(get_run))
        .route("/api/runs/latest", get(get_latest_run))
        .route("/api/stats", get(get_stats))
        // Health
        .route("/health", get(health_handler))
        // The generated page, served straight from the work tree
        .nest_service("/site", page)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

// ── Webhook ──

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    crate::metrics::webhook_received(
        headers
            .get("x-github-event")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown"),
    );

    webhook::handle_webhook(
        &state.store,
        &state.config,
        &state.site.publish.branch,
        &headers,
        &body,
    )
    .await
}

// ── Run API ──

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub id: i64,
    pub status: String,
}

async fn trigger_run_handler(
    State(state): State<AppState>,
    body: Option<Json<TriggerRequest>>,
) -> Result<(StatusCode, Json<TriggerResponse>), StatusCode> {
    let Json(req) = body.unwrap_or_default();
    let new_run = NewRun::manual(&state.site.publish.branch, req.dry_run);
    match state.store.enqueue(new_run).await {
        EnqueueOutcome::Queued(id) => {
            crate::metrics::run_created("manual");
            tracing::info!(run_id = id, dry_run = req.dry_run, "Manual run queued");
            Ok((
                StatusCode::CREATED,
                Json(TriggerResponse {
                    id,
                    status: "pending".to_string(),
                }),
            ))
        }
        EnqueueOutcome::Throttled => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<usize>,
}

async fn list_runs_handler(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Json<Vec<Run>> {
    Json(state.store.list(query.limit.unwrap_or(20)).await)
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> Result<Json<Run>, StatusCode> {
    state
        .store
        .get(run_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_latest_run(State(state): State<AppState>) -> Result<Json<Run>, StatusCode> {
    state
        .store
        .latest()
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_stats(State(state): State<AppState>) -> Json<RunStats> {
    Json(state.store.stats().await)
}

// ── Health ──

async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<health::HealthReport>) {
    let report = health::check(&state).await;
    (report.status_code(), Json(report))
}
