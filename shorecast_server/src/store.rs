//! In-memory run registry.
//!
//! Holds every queued, running, and recently finished run behind one lock.
//! Enqueueing applies fingerprint throttling, claiming serializes
//! execution (one run at a time), and history is pruned to a cap so the
//! daemon's memory stays bounded across months of 15-minute ticks.

use std::collections::VecDeque;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{NewRun, Run, RunStatus, StepRecord, StepStatus};

pub struct RunStore {
    inner: RwLock<Inner>,
    throttle_window: Duration,
    history_limit: usize,
}

struct Inner {
    next_id: i64,
    /// Ordered by id; oldest at the front.
    runs: VecDeque<Run>,
}

/// What happened to an enqueue attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(i64),
    Throttled,
}

/// Aggregates for the stats endpoint.
#[derive(Debug, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failure: usize,
    /// Successes over terminal runs; 0.0 before the first run finishes.
    pub success_rate: f64,
    pub avg_duration_ms: Option<i64>,
    pub last_published_commit: Option<String>,
    pub last_finished_at: Option<chrono::DateTime<Utc>>,
}

impl RunStore {
    pub fn new(throttle_window_secs: u64, history_limit: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                runs: VecDeque::new(),
            }),
            throttle_window: Duration::seconds(throttle_window_secs as i64),
            history_limit,
        }
    }

    /// Queues a run unless an equivalent one is already active or finished
    /// inside the throttle window.
    pub async fn enqueue(&self, new_run: NewRun) -> EnqueueOutcome {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let cutoff = now - self.throttle_window;
        let duplicate = inner.runs.iter().any(|r| {
            r.fingerprint == new_run.fingerprint
                && (!r.status.is_terminal() || r.created_at > cutoff)
        });
        if duplicate {
            return EnqueueOutcome::Throttled;
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.runs.push_back(Run {
            id,
            delivery_id: new_run.delivery_id,
            trigger_event: new_run.trigger_event,
            commit_sha: new_run.commit_sha,
            branch: new_run.branch,
            pr_number: new_run.pr_number,
            author: new_run.author,
            message: new_run.message,
            fingerprint: new_run.fingerprint,
            dry_run: new_run.dry_run,
            status: RunStatus::Pending,
            created_at: now,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            published_commit: None,
            summary: None,
            steps: Vec::new(),
        });
        let limit = self.history_limit;
        prune(&mut inner, limit);
        EnqueueOutcome::Queued(id)
    }

    /// Claims the oldest pending run, marking it running. Returns `None`
    /// while another run is executing; runs are strictly serialized so two
    /// pipelines never fight over the same work tree.
    pub async fn claim_next_pending(&self) -> Option<Run> {
        let mut inner = self.inner.write().await;
        if inner.runs.iter().any(|r| r.status == RunStatus::Running) {
            return None;
        }
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.status == RunStatus::Pending)?;
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        Some(run.clone())
    }

    /// Appends a running step record and returns its sequence number.
    pub async fn start_step(&self, run_id: i64, name: &str) -> i32 {
        let mut inner = self.inner.write().await;
        let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) else {
            return 0;
        };
        let sequence = run.steps.len() as i32 + 1;
        run.steps.push(StepRecord {
            name: name.to_string(),
            sequence,
            status: StepStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            detail: None,
        });
        sequence
    }

    pub async fn complete_step(
        &self,
        run_id: i64,
        sequence: i32,
        status: StepStatus,
        detail: Option<String>,
    ) {
        let mut inner = self.inner.write().await;
        let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) else {
            return;
        };
        let Some(step) = run.steps.iter_mut().find(|s| s.sequence == sequence) else {
            return;
        };
        let now = Utc::now();
        step.status = status;
        step.finished_at = Some(now);
        step.duration_ms = Some((now - step.started_at).num_milliseconds());
        step.detail = detail;
    }

    pub async fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        published_commit: Option<String>,
        summary: Option<String>,
    ) {
        let mut inner = self.inner.write().await;
        let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) else {
            return;
        };
        let now = Utc::now();
        run.status = status;
        run.finished_at = Some(now);
        run.duration_ms = Some((now - run.started_at.unwrap_or(run.created_at)).num_milliseconds());
        run.published_commit = published_commit;
        run.summary = summary;
    }

    pub async fn get(&self, run_id: i64) -> Option<Run> {
        let inner = self.inner.read().await;
        inner.runs.iter().find(|r| r.id == run_id).cloned()
    }

    pub async fn latest(&self) -> Option<Run> {
        let inner = self.inner.read().await;
        inner.runs.back().cloned()
    }

    /// Newest runs first.
    pub async fn list(&self, limit: usize) -> Vec<Run> {
        let inner = self.inner.read().await;
        inner.runs.iter().rev().take(limit).cloned().collect()
    }

    pub async fn stats(&self) -> RunStats {
        let inner = self.inner.read().await;
        let total = inner.runs.len();
        let mut pending = 0;
        let mut running = 0;
        let mut success = 0;
        let mut failure = 0;
        let mut durations = Vec::new();
        let mut last_published_commit = None;
        let mut last_finished_at = None;
        for run in &inner.runs {
            match run.status {
                RunStatus::Pending => pending += 1,
                RunStatus::Running => running += 1,
                RunStatus::Success => success += 1,
                RunStatus::Failure => failure += 1,
            }
            if run.status.is_terminal() {
                if let Some(d) = run.duration_ms {
                    durations.push(d);
                }
                if let Some(finished) = run.finished_at {
                    if last_finished_at.is_none_or(|prev| finished > prev) {
                        last_finished_at = Some(finished);
                    }
                }
            }
            if run.published_commit.is_some() {
                last_published_commit = run.published_commit.clone();
            }
        }
        let terminal = success + failure;
        let success_rate = if terminal > 0 {
            success as f64 / terminal as f64
        } else {
            0.0
        };
        let avg_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<i64>() / durations.len() as i64)
        };
        RunStats {
            total,
            pending,
            running,
            success,
            failure,
            success_rate,
            avg_duration_ms,
            last_published_commit,
            last_finished_at,
        }
    }
}

/// Drops the oldest terminal runs once the cap is exceeded. Pending and
/// running runs are never dropped.
fn prune(inner: &mut Inner, limit: usize) {
    while inner.runs.len() > limit {
        let Some(pos) = inner.runs.iter().position(|r| r.status.is_terminal()) else {
            break;
        };
        inner.runs.remove(pos);
    }
}
