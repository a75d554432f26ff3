//! Daemon configuration — loaded from environment variables.

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// GitHub webhook secret for HMAC validation.
    pub webhook_secret: String,
    /// Seconds between scheduled runs.
    pub interval_secs: u64,
    /// Per-step execution timeout in seconds.
    pub step_timeout_secs: u64,
    /// Throttle window in seconds between duplicate runs.
    pub throttle_window_secs: u64,
    /// Finished runs kept in memory for the API.
    pub history_limit: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let webhook_secret = std::env::var("SHORECAST_WEBHOOK_SECRET").unwrap_or_default();
        let interval_secs = std::env::var("SHORECAST_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(900);
        let step_timeout_secs = std::env::var("SHORECAST_STEP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(600);
        let throttle_window_secs = std::env::var("SHORECAST_THROTTLE_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        let history_limit = std::env::var("SHORECAST_HISTORY_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        if webhook_secret.is_empty() {
            tracing::warn!(
                "SHORECAST_WEBHOOK_SECRET not set -- webhook signature validation disabled"
            );
        }

        Self {
            webhook_secret,
            interval_secs,
            step_timeout_secs,
            throttle_window_secs,
            history_limit,
        }
    }
}
