//! Shared HTTP plumbing for the fetch stages.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{PipelineError, Result};

pub const USER_AGENT: &str = concat!("shorecast/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the client shared by all fetch stages.
pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::Http {
            context: "building http client".to_string(),
            source: e,
        })
}

/// GET `url` and return the body as text. Non-2xx statuses are errors.
pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str, context: &str) -> Result<String> {
    let err = |source| PipelineError::Http {
        context: format!("{context} ({url})"),
        source,
    };
    let response = client.get(url).send().await.map_err(err)?;
    let response = response.error_for_status().map_err(err)?;
    response.text().await.map_err(err)
}

/// GET `url` and deserialize the JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    context: &str,
) -> Result<T> {
    let err = |source| PipelineError::Http {
        context: format!("{context} ({url})"),
        source,
    };
    let response = client.get(url).timeout(timeout).send().await.map_err(err)?;
    let response = response.error_for_status().map_err(err)?;
    response.json().await.map_err(err)
}
