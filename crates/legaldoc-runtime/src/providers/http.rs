//! Shared HTTP plumbing for the REST provider adapters.

use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use std::time::Duration;

use super::ProviderError;

static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Process-wide HTTP client. Per-request timeouts are set by each adapter.
pub(crate) fn client() -> Result<&'static reqwest::Client, ProviderError> {
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProviderError::HttpError(format!("Failed to build HTTP client: {}", e)))?;

    Ok(CLIENT.get_or_init(|| client))
}

/// Map a transport failure.
pub(crate) fn send_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::HttpError(error.to_string())
    }
}

/// Decode a successful response body, or turn an error status into a `ProviderError`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();

    if !status.is_success() {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        return Err(ProviderError::from_status(
            status.as_u16(),
            error_message(&body),
            retry_after,
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Pull `error.message` out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect())
}
