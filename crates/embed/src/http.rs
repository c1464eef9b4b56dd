use englishy_common::{EncodingErrorKind, EnglishyError, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Longest provider error body echoed into an error message
const MAX_ERROR_BODY: usize = 500;

/// Build the HTTP client shared by a provider
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EnglishyError::config(format!("Failed to create HTTP client: {}", e)))
}

/// Send a JSON request and decode the JSON answer, classifying failures
pub(crate) async fn send_json<T: DeserializeOwned>(provider: &str, request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EnglishyError::encoding(
            EncodingErrorKind::from_status(status.as_u16()),
            format!("{} API error {}: {}", provider, status, truncate(&body)),
        ));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    serde_json::from_slice(&body).map_err(|e| {
        EnglishyError::encoding(
            EncodingErrorKind::InvalidResponse,
            format!("Failed to parse {} response: {}", provider, e),
        )
    })
}

fn transport_error(provider: &str, err: &reqwest::Error) -> EnglishyError {
    let kind = if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        EncodingErrorKind::Network
    } else if let Some(status) = err.status() {
        EncodingErrorKind::from_status(status.as_u16())
    } else if err.is_decode() {
        EncodingErrorKind::InvalidResponse
    } else {
        EncodingErrorKind::Unknown
    };
    EnglishyError::encoding(kind, format!("{} request failed: {}", provider, err))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_BODY + 10);
        assert_eq!(truncate(&long).chars().count(), MAX_ERROR_BODY);
        assert_eq!(truncate("short"), "short");
    }
}
