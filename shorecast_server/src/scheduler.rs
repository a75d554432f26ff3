//! Interval scheduler. Queues a run every tick, the daemon's stand-in
//! for a cron entry. The shared fingerprint means a tick that lands
//! while the previous scheduled run is still in flight gets throttled
//! instead of piling up.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::metrics;
use crate::models::NewRun;
use crate::store::{EnqueueOutcome, RunStore};

/// Runs forever. Spawned as a background tokio task. The first tick
/// fires immediately so a freshly started daemon publishes right away.
pub async fn run_scheduler(store: Arc<RunStore>, branch: String, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "Schedule trigger started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match store.enqueue(NewRun::schedule(&branch)).await {
            EnqueueOutcome::Queued(id) => {
                metrics::run_created("schedule");
                info!(run_id = id, "Scheduled run queued");
            }
            EnqueueOutcome::Throttled => {
                debug!("Previous scheduled run still in flight, skipping tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunStatus, TriggerEvent};

    #[tokio::test(start_paused = true)]
    async fn first_tick_queues_immediately() {
        let store = Arc::new(RunStore::new(0, 100));
        tokio::spawn(run_scheduler(
            Arc::clone(&store),
            "main".to_string(),
            Duration::from_secs(900),
        ));

        tokio::time::sleep(Duration::from_millis(1)).await;
        let run = store.latest().await.unwrap();
        assert_eq!(run.trigger_event, TriggerEvent::Schedule);
        assert_eq!(run.branch, "main");
    }

    #[tokio::test(start_paused = true)]
    async fn pending_run_throttles_next_tick() {
        let store = Arc::new(RunStore::new(0, 100));
        tokio::spawn(run_scheduler(
            Arc::clone(&store),
            "main".to_string(),
            Duration::from_secs(900),
        ));

        // First tick queues; second tick finds the run still pending.
        tokio::time::sleep(Duration::from_secs(901)).await;
        assert_eq!(store.list(10).await.len(), 1);

        // Once it finishes, the following tick queues again.
        let run = store.claim_next_pending().await.unwrap();
        store
            .finish_run(run.id, RunStatus::Success, None, None)
            .await;
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(store.list(10).await.len(), 2);
    }
}
