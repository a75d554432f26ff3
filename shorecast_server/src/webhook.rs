//! GitHub webhook intake.
//!
//! Validates the `X-Hub-Signature-256` HMAC, parses push and pull request
//! payloads, and queues runs for events that touch the publish branch.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::metrics;
use crate::models::{NewRun, TriggerEvent};
use crate::store::{EnqueueOutcome, RunStore};

type HmacSha256 = Hmac<Sha256>;

/// Validates the webhook payload signature. An unset secret disables
/// validation (with a warning) so local setups keep working.
pub fn validate_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        warn!("Webhook secret not configured, skipping signature validation");
        return true;
    }

    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&sig_bytes).is_ok()
}

/// Entry point for `POST /hooks/github`.
pub async fn handle_webhook(
    store: &RunStore,
    config: &Arc<ServerConfig>,
    publish_branch: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !validate_signature(&config.webhook_secret, body, signature) {
        warn!("Webhook signature validation failed");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let delivery_id = headers
        .get("x-github-delivery")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4);

    let payload: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| StatusCode::BAD_REQUEST)?;

    match event {
        "push" => handle_push(store, publish_branch, delivery_id, &payload).await,
        "pull_request" => handle_pull_request(store, publish_branch, delivery_id, &payload).await,
        "ping" => {
            info!("Received ping event");
            Ok(StatusCode::OK)
        }
        other => {
            debug!(event = other, "Ignoring webhook event");
            Ok(StatusCode::OK)
        }
    }
}

async fn handle_push(
    store: &RunStore,
    publish_branch: &str,
    delivery_id: Uuid,
    payload: &serde_json::Value,
) -> Result<StatusCode, StatusCode> {
    let Some(event) = parse_push(payload) else {
        return Ok(StatusCode::OK);
    };
    if event.branch != publish_branch {
        debug!(
            branch = %event.branch,
            "Ignoring push to non-publish branch"
        );
        return Ok(StatusCode::OK);
    }

    let fingerprint = format!("{}-{}-push", event.commit_sha, event.branch);
    let new_run = NewRun {
        delivery_id,
        trigger_event: TriggerEvent::Push,
        commit_sha: Some(event.commit_sha),
        branch: event.branch,
        pr_number: None,
        author: event.author,
        message: event.message,
        fingerprint,
        dry_run: false,
    };
    enqueue(store, new_run, "push").await
}

async fn handle_pull_request(
    store: &RunStore,
    publish_branch: &str,
    delivery_id: Uuid,
    payload: &serde_json::Value,
) -> Result<StatusCode, StatusCode> {
    let Some(event) = parse_pull_request(payload) else {
        return Ok(StatusCode::OK);
    };
    if event.base_branch != publish_branch {
        debug!(
            base = %event.base_branch,
            "Ignoring pull request against non-publish branch"
        );
        return Ok(StatusCode::OK);
    }

    let fingerprint = format!("{}-{}-pr{}", event.commit_sha, event.branch, event.number);
    let new_run = NewRun {
        delivery_id,
        trigger_event: TriggerEvent::PullRequest,
        commit_sha: Some(event.commit_sha),
        branch: event.branch,
        pr_number: Some(event.number),
        author: event.author,
        message: event.title,
        fingerprint,
        dry_run: false,
    };
    enqueue(store, new_run, "pull_request").await
}

async fn enqueue(
    store: &RunStore,
    new_run: NewRun,
    trigger: &'static str,
) -> Result<StatusCode, StatusCode> {
    let fingerprint = new_run.fingerprint.clone();
    match store.enqueue(new_run).await {
        EnqueueOutcome::Queued(id) => {
            metrics::run_created(trigger);
            info!(run_id = id, trigger, "Webhook run queued");
            Ok(StatusCode::CREATED)
        }
        EnqueueOutcome::Throttled => {
            info!("Duplicate run throttled: {fingerprint}");
            Ok(StatusCode::OK)
        }
    }
}

struct PushEvent {
    commit_sha: String,
    branch: String,
    author: Option<String>,
    message: Option<String>,
}

fn parse_push(payload: &serde_json::Value) -> Option<PushEvent> {
    let commit_sha = payload.get("after")?.as_str()?.to_string();
    let branch = payload
        .get("ref")?
        .as_str()?
        .strip_prefix("refs/heads/")
        .unwrap_or_default()
        .to_string();
    if commit_sha.is_empty() || branch.is_empty() {
        return None;
    }
    let head = payload.get("head_commit");
    let author = head
        .and_then(|c| c.get("author"))
        .and_then(|a| a.get("name"))
        .and_then(|n| n.as_str())
        .map(String::from);
    let message = head
        .and_then(|c| c.get("message"))
        .and_then(|m| m.as_str())
        .map(String::from);
    Some(PushEvent {
        commit_sha,
        branch,
        author,
        message,
    })
}

struct PullRequestEvent {
    number: i64,
    commit_sha: String,
    branch: String,
    base_branch: String,
    author: Option<String>,
    title: Option<String>,
}

fn parse_pull_request(payload: &serde_json::Value) -> Option<PullRequestEvent> {
    let action = payload.get("action")?.as_str()?;
    if !matches!(action, "opened" | "synchronize" | "reopened") {
        debug!(action, "Ignoring pull request action");
        return None;
    }

    let pr = payload.get("pull_request")?;
    let number = payload.get("number")?.as_i64()?;
    let commit_sha = pr.get("head")?.get("sha")?.as_str()?.to_string();
    let branch = pr.get("head")?.get("ref")?.as_str()?.to_string();
    let base_branch = pr.get("base")?.get("ref")?.as_str()?.to_string();
    let author = pr
        .get("user")
        .and_then(|u| u.get("login"))
        .and_then(|l| l.as_str())
        .map(String::from);
    let title = pr.get("title").and_then(|t| t.as_str()).map(String::from);
    Some(PullRequestEvent {
        number,
        commit_sha,
        branch,
        base_branch,
        author,
        title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let payload = b"{\"zen\":\"Keep it logically awesome.\"}";
        let signature = sign("s3cret", payload);
        assert!(validate_signature("s3cret", payload, &signature));
    }

    #[test]
    fn tampered_payload_fails() {
        let signature = sign("s3cret", b"original");
        assert!(!validate_signature("s3cret", b"tampered", &signature));
    }

    #[test]
    fn malformed_hex_fails() {
        assert!(!validate_signature("s3cret", b"payload", "sha256=zzzz"));
    }

    #[test]
    fn empty_secret_accepts_anything() {
        assert!(validate_signature("", b"payload", "sha256=whatever"));
    }

    #[test]
    fn parse_push_extracts_fields() {
        let payload = json!({
            "after": "0123abc",
            "ref": "refs/heads/main",
            "head_commit": {
                "message": "Tweak cam layout",
                "author": {"name": "dev"}
            }
        });
        let event = parse_push(&payload).unwrap();
        assert_eq!(event.commit_sha, "0123abc");
        assert_eq!(event.branch, "main");
        assert_eq!(event.author.as_deref(), Some("dev"));
        assert_eq!(event.message.as_deref(), Some("Tweak cam layout"));
    }

    #[test]
    fn parse_push_rejects_tag_refs() {
        let payload = json!({
            "after": "0123abc",
            "ref": "refs/tags/v1.0"
        });
        assert!(parse_push(&payload).is_none());
    }

    #[test]
    fn parse_pull_request_extracts_fields() {
        let payload = json!({
            "action": "synchronize",
            "number": 12,
            "pull_request": {
                "head": {"sha": "feedface", "ref": "feature/buoy"},
                "base": {"ref": "main"},
                "user": {"login": "dev"},
                "title": "Add buoy card"
            }
        });
        let event = parse_pull_request(&payload).unwrap();
        assert_eq!(event.number, 12);
        assert_eq!(event.commit_sha, "feedface");
        assert_eq!(event.branch, "feature/buoy");
        assert_eq!(event.base_branch, "main");
        assert_eq!(event.author.as_deref(), Some("dev"));
    }

    #[test]
    fn parse_pull_request_ignores_closed_action() {
        let payload = json!({
            "action": "closed",
            "number": 12,
            "pull_request": {
                "head": {"sha": "feedface", "ref": "feature/buoy"},
                "base": {"ref": "main"}
            }
        });
        assert!(parse_pull_request(&payload).is_none());
    }

    #[tokio::test]
    async fn push_to_other_branch_is_ignored() {
        let store = RunStore::new(60, 100);
        let payload = json!({
            "after": "0123abc",
            "ref": "refs/heads/feature/other"
        });
        let status = handle_push(&store, "main", Uuid::new_v4(), &payload)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(store.latest().await.is_none());
    }

    #[tokio::test]
    async fn push_to_publish_branch_queues_run() {
        let store = RunStore::new(60, 100);
        let payload = json!({
            "after": "0123abc",
            "ref": "refs/heads/main"
        });
        let status = handle_push(&store, "main", Uuid::new_v4(), &payload)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let run = store.latest().await.unwrap();
        assert_eq!(run.trigger_event, TriggerEvent::Push);
        assert_eq!(run.fingerprint, "0123abc-main-push");

        // Redelivery of the same event is throttled, not duplicated.
        let status = handle_push(&store, "main", Uuid::new_v4(), &payload)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.list(10).await.len(), 1);
    }

    #[tokio::test]
    async fn pull_request_against_publish_branch_queues_run() {
        let store = RunStore::new(60, 100);
        let payload = json!({
            "action": "opened",
            "number": 7,
            "pull_request": {
                "head": {"sha": "feedface", "ref": "feature/buoy"},
                "base": {"ref": "main"},
                "user": {"login": "dev"},
                "title": "Add buoy card"
            }
        });
        let status = handle_pull_request(&store, "main", Uuid::new_v4(), &payload)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let run = store.latest().await.unwrap();
        assert_eq!(run.trigger_event, TriggerEvent::PullRequest);
        assert_eq!(run.pr_number, Some(7));
        assert_eq!(run.fingerprint, "feedface-feature/buoy-pr7");
    }
}
