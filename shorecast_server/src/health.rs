//! Health endpoint internals. Checks that the work tree is usable for
//! publish runs and surfaces the most recent terminal run.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;

use shorecast_pipeline::git;

use crate::models::RunStatus;
use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: HealthChecks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<LastRunBrief>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub work_tree: CheckResult,
    pub template: CheckResult,
    pub last_run: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LastRunBrief {
    pub id: i64,
    pub status: RunStatus,
    pub finished_at: Option<DateTime<Utc>>,
}

impl HealthReport {
    /// 200 on Ok/Degraded, 503 on Unhealthy.
    pub fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub async fn check(state: &AppState) -> HealthReport {
    let work_tree = check_work_tree(state).await;
    let template = check_template(state);
    let (last_run, brief) = check_last_run(state).await;

    let checks = HealthChecks {
        work_tree,
        template,
        last_run,
    };
    let status = aggregate_status(&checks);
    HealthReport {
        status,
        checks,
        last_run: brief,
    }
}

/// Publish runs need a git work tree; without one the daemon is only
/// good for dry runs.
async fn check_work_tree(state: &AppState) -> CheckResult {
    if !state.work_dir.is_dir() {
        return CheckResult::unhealthy(format!("{} is not a directory", state.work_dir.display()));
    }
    if !git::is_repo(&state.work_dir).await {
        return CheckResult::unhealthy(format!(
            "{} is not a git repository",
            state.work_dir.display()
        ));
    }
    CheckResult::healthy()
}

fn check_template(state: &AppState) -> CheckResult {
    let path = state.work_dir.join(&state.site.template);
    if path.is_file() {
        CheckResult::healthy()
    } else {
        CheckResult::unhealthy(format!("{} missing", path.display()))
    }
}

async fn check_last_run(state: &AppState) -> (CheckResult, Option<LastRunBrief>) {
    let runs = state.store.list(state.config.history_limit).await;
    let Some(last) = runs.into_iter().find(|r| r.status.is_terminal()) else {
        return (CheckResult::healthy(), None);
    };
    let brief = LastRunBrief {
        id: last.id,
        status: last.status,
        finished_at: last.finished_at,
    };
    let check = match last.status {
        RunStatus::Failure => CheckResult::unhealthy(
            last.summary
                .unwrap_or_else(|| format!("run {} failed", last.id)),
        ),
        _ => CheckResult::healthy(),
    };
    (check, Some(brief))
}

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    if !checks.work_tree.ok {
        return HealthStatus::Unhealthy;
    }
    if !checks.template.ok || !checks.last_run.ok {
        return HealthStatus::Degraded;
    }
    HealthStatus::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::store::RunStore;
    use shorecast_pipeline::config::SiteConfig;
    use std::sync::Arc;

    fn state_for(work_dir: std::path::PathBuf) -> AppState {
        AppState {
            store: Arc::new(RunStore::new(60, 100)),
            config: Arc::new(ServerConfig {
                webhook_secret: String::new(),
                interval_secs: 900,
                step_timeout_secs: 600,
                throttle_window_secs: 60,
                history_limit: 100,
            }),
            site: Arc::new(SiteConfig::default()),
            work_dir,
        }
    }

    #[tokio::test]
    async fn bare_directory_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path().to_path_buf());
        let report = check(&state).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.checks.work_tree.ok);
        assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn missing_directory_is_unhealthy() {
        let state = state_for(std::path::PathBuf::from("/nonexistent/shorecast"));
        let report = check(&state).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn degraded_when_only_template_or_last_run_fail() {
        let checks = HealthChecks {
            work_tree: CheckResult::healthy(),
            template: CheckResult::unhealthy("template.html missing"),
            last_run: CheckResult::healthy(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Degraded);

        let checks = HealthChecks {
            work_tree: CheckResult::healthy(),
            template: CheckResult::healthy(),
            last_run: CheckResult::unhealthy("render: boom"),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Degraded);

        let checks = HealthChecks {
            work_tree: CheckResult::healthy(),
            template: CheckResult::healthy(),
            last_run: CheckResult::healthy(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Ok);
    }
}
