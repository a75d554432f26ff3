//! Run records — one pipeline execution and its steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What caused a run to be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Schedule,
    Push,
    PullRequest,
    Manual,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Success,
    Failure,
    Skipped,
}

/// One executed (or skipped) pipeline step within a run.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub sequence: i32,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// One-line outcome: a summary on success, the error on failure.
    pub detail: Option<String>,
}

/// A pipeline run as exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub id: i64,
    pub delivery_id: Uuid,
    pub trigger_event: TriggerEvent,
    pub commit_sha: Option<String>,
    pub branch: String,
    pub pr_number: Option<i64>,
    pub author: Option<String>,
    pub message: Option<String>,
    pub fingerprint: String,
    pub dry_run: bool,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// HEAD sha after a successful publish step.
    pub published_commit: Option<String>,
    /// Failure summary for failed runs.
    pub summary: Option<String>,
    pub steps: Vec<StepRecord>,
}

/// Fields the trigger sources provide when queueing a run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub delivery_id: Uuid,
    pub trigger_event: TriggerEvent,
    pub commit_sha: Option<String>,
    pub branch: String,
    pub pr_number: Option<i64>,
    pub author: Option<String>,
    pub message: Option<String>,
    pub fingerprint: String,
    pub dry_run: bool,
}

impl NewRun {
    /// A scheduled heartbeat run. The fixed fingerprint means a tick is
    /// throttled while the previous scheduled run is still in flight.
    pub fn schedule(branch: &str) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            trigger_event: TriggerEvent::Schedule,
            commit_sha: None,
            branch: branch.to_string(),
            pr_number: None,
            author: None,
            message: None,
            fingerprint: "schedule".to_string(),
            dry_run: false,
        }
    }

    /// A manually triggered run. Each gets a unique fingerprint so
    /// operators are never throttled against themselves.
    pub fn manual(branch: &str, dry_run: bool) -> Self {
        let delivery_id = Uuid::new_v4();
        Self {
            delivery_id,
            trigger_event: TriggerEvent::Manual,
            commit_sha: None,
            branch: branch.to_string(),
            pr_number: None,
            author: None,
            message: None,
            fingerprint: format!("manual-{delivery_id}"),
            dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_event_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TriggerEvent::PullRequest).unwrap(),
            r#""pull_request""#
        );
        assert_eq!(TriggerEvent::PullRequest.as_str(), "pull_request");
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failure.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn manual_fingerprints_are_unique() {
        let a = NewRun::manual("main", false);
        let b = NewRun::manual("main", false);
        assert_ne!(a.fingerprint, b.fingerprint);
        assert!(a.fingerprint.starts_with("manual-"));
    }
}
