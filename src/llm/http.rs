//! Shared HTTP plumbing for provider connectors.
//!
//! Executes one prepared request and maps transport and status failures
//! onto the connector error taxonomy. Retrying lives a level up, in
//! [`crate::llm::retry`], so every connector fails the same way.

use crate::llm::ConnectorError;
use tracing::debug;

/// Send a prepared JSON request and deserialize the response body.
///
/// Status mapping:
/// - 401/403 -> `Auth`
/// - 429 -> `Transient` carrying the `retry-after` header when present
/// - 5xx -> `Transient`
/// - other 4xx -> `Unavailable`
/// - unparseable success body -> `InvalidResponse`
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<T, ConnectorError> {
    let response = request.send().await.map_err(|err| {
        if err.is_timeout() {
            ConnectorError::Transient {
                provider: provider.to_string(),
                message: "request timed out".to_string(),
                retry_after: None,
            }
        } else {
            ConnectorError::Transient {
                provider: provider.to_string(),
                message: format!("network error: {err}"),
                retry_after: None,
            }
        }
    })?;

    let status = response.status();
    debug!(provider, status = %status, "API response status");

    if status.is_success() {
        let body = response.text().await.map_err(|err| ConnectorError::Transient {
            provider: provider.to_string(),
            message: format!("failed to read response body: {err}"),
            retry_after: None,
        })?;
        return serde_json::from_str::<T>(&body).map_err(|err| ConnectorError::InvalidResponse {
            provider: provider.to_string(),
            message: format!("failed to parse response: {err}"),
        });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectorError::Auth {
            provider: provider.to_string(),
            message: format!("{status}: {body}"),
        });
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(ConnectorError::Transient {
            provider: provider.to_string(),
            message: "rate limit exceeded".to_string(),
            retry_after,
        });
    }

    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConnectorError::Transient {
            provider: provider.to_string(),
            message: format!("server error {status}: {body}"),
            retry_after: None,
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(ConnectorError::Unavailable {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {body}"),
    })
}
