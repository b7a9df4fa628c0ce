//! Shared HTTP plumbing for the REST providers.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::domain::ports::ProviderError;

/// Build a pooled HTTP client with a hard per-request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .tcp_nodelay(true)
        .build()
        .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")))
}

/// Send `request` and decode a JSON body, mapping error statuses.
pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        debug!(status = status.as_u16(), "provider returned an error status");
        return Err(ProviderError::from_status(status.as_u16(), body));
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::MalformedResponse(format!("unexpected response body: {e}")))
}

/// Strip a trailing slash so paths can be appended with `format!`.
pub fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Milliseconds elapsed since `start`, saturating.
pub fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_base_url() {
        assert_eq!(trim_base_url("http://localhost:1234/"), "http://localhost:1234");
        assert_eq!(trim_base_url("https://api.openai.com"), "https://api.openai.com");
    }

    #[tokio::test]
    async fn test_error_status_is_classified() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/thing")
            .with_status(529)
            .with_body(r#"{"error":{"type":"overloaded_error"}}"#)
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let result: Result<serde_json::Value, _> =
            send_json(client.get(format!("{}/thing", server.url()))).await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/thing")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let result: Result<serde_json::Value, _> =
            send_json(client.get(format!("{}/thing", server.url()))).await;

        assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
    }
}
