//! The `HttpTransport` seam between the fetcher and the network.
//!
//! The fetcher only needs a status code, the `Retry-After` hint and a body,
//! so the seam is that small. Tests script replies through it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A raw HTTP reply, status not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// Parsed `Retry-After` header (delta-seconds form).
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, retry_after: None, body: body.into() }
    }

    pub fn status(status: u16) -> Self {
        Self { status, retry_after: None, body: String::new() }
    }
}

/// Failure before any HTTP status was received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, reset, TLS failure, etc.
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,
}

/// Minimal async HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<HttpReply, TransportError>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError>;
}

// ─── reqwest ──────────────────────────────────────────────────────────────────

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("govindex/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    async fn read(resp: reqwest::Response) -> Result<HttpReply, TransportError> {
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = resp.text().await.map_err(map_reqwest)?;
        Ok(HttpReply { status, retry_after, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpReply, TransportError> {
        let resp = self.http.get(url).send().await.map_err(map_reqwest)?;
        Self::read(resp).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
        let resp = self.http.post(url).json(body).send().await.map_err(map_reqwest)?;
        Self::read(resp).await
    }
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Parse the delta-seconds form of `Retry-After`. HTTP-date hints are ignored
/// and fall back to computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("1"), Some(Duration::from_secs(1)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
