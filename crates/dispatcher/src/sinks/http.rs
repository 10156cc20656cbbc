//! Shared HTTP plumbing for network-backed sinks
//!
//! Every request goes through [`send`], which maps transport failures and
//! status codes onto [`DeliveryError`].

use std::time::Duration;

use contracts::{ContractError, DeliveryError};
use reqwest::{RequestBuilder, Response, Url};

/// Upper bound on response bytes kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client owned by one sink
///
/// No request timeout: the worker bounds every attempt.
pub(crate) fn build_client(sink_name: &str) -> Result<reqwest::Client, ContractError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("event-exporter/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            ContractError::sink_construction(sink_name, format!("failed to build HTTP client: {e}"))
        })
}

/// Parse and check an endpoint reference
pub(crate) fn parse_url(sink_name: &str, raw: &str) -> Result<Url, ContractError> {
    let url = Url::parse(raw).map_err(|e| {
        ContractError::sink_construction(sink_name, format!("invalid endpoint '{raw}': {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ContractError::sink_construction(
            sink_name,
            format!("unsupported URL scheme '{other}' in '{raw}'"),
        )),
    }
}

/// Send a request and classify the response
///
/// Returns the body of a 2xx response.
pub(crate) async fn send(request: RequestBuilder) -> Result<String, DeliveryError> {
    let response = request.send().await.map_err(classify_transport)?;
    read_classified(response).await
}

fn classify_transport(e: reqwest::Error) -> DeliveryError {
    if e.is_timeout() {
        return DeliveryError::network(format!("request timed out: {e}"));
    }
    if e.is_connect() {
        return DeliveryError::network(format!("connection failed: {e}"));
    }
    if e.is_builder() {
        return DeliveryError::encode(format!("invalid request: {e}"));
    }
    DeliveryError::network(e.to_string())
}

async fn read_classified(response: Response) -> Result<String, DeliveryError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| DeliveryError::network(format!("failed to read response body: {e}")))?;
    classify_status(status, body)
}

/// Map a status code onto retryable / fatal failures
pub(crate) fn classify_status(status: u16, body: String) -> Result<String, DeliveryError> {
    match status {
        200..=299 => Ok(body),
        429 => Err(DeliveryError::throttled(format!(
            "HTTP 429: {}",
            truncate(&body)
        ))),
        408 | 500..=599 => Err(DeliveryError::Server {
            status,
            body: truncate(&body),
        }),
        401 | 403 => Err(DeliveryError::Unauthorized { status }),
        _ => Err(DeliveryError::Rejected {
            status,
            body: truncate(&body),
        }),
    }
}

pub(crate) fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(202, String::new()).is_ok());
        assert!(classify_status(503, String::new()).unwrap_err().is_retryable());
        assert!(classify_status(408, String::new()).unwrap_err().is_retryable());
        assert!(matches!(
            classify_status(429, String::new()),
            Err(DeliveryError::Throttled { .. })
        ));
        assert!(matches!(
            classify_status(403, String::new()),
            Err(DeliveryError::Unauthorized { status: 403 })
        ));
        assert!(!classify_status(400, String::new()).unwrap_err().is_retryable());
        assert!(!classify_status(302, String::new()).unwrap_err().is_retryable());
    }

    #[test]
    fn test_parse_url_rejects_bad_scheme() {
        assert!(parse_url("a", "https://example.com/hook").is_ok());
        assert!(parse_url("a", "ftp://example.com").is_err());
        assert!(parse_url("a", "not a url").is_err());
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(2_000);
        assert_eq!(truncate(&body).len(), MAX_ERROR_BODY + 3);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let client = build_client("a").unwrap();
        // port 9 (discard) is closed on test hosts
        let err = send(client.post("http://127.0.0.1:9/")).await.unwrap_err();
        assert!(err.is_retryable(), "got: {err}");
    }
}
