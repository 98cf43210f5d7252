//! `ResilientFetcher`: the single place upstream requests are issued.
//!
//! Features:
//! - Bounded retry with exponential backoff for network errors and 5xx
//! - `Retry-After` compliance on HTTP 429
//! - 404/204 surface as `Ok(None)`, never as errors
//! - Successful bodies cached under the full URL (plus body for POST)

use std::sync::Arc;

use serde_json::Value;

use govindex_core::cache::{BoundedCache, CacheConfig};
use govindex_core::error::IndexerError;

use crate::retry::{RetryConfig, RetryPolicy};
use crate::transport::{HttpReply, HttpTransport};

/// Whether a successful response may be served from and written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caching {
    Cached,
    /// For values that move with the chain head.
    Bypass,
}

#[derive(Clone, Copy)]
enum Request<'a> {
    Get,
    Post(&'a Value),
}

/// Upstream fetcher with retry and response caching.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    cache: BoundedCache<String, Value>,
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryConfig, cache: &CacheConfig) -> Self {
        Self {
            transport,
            retry: RetryPolicy::new(retry),
            cache: BoundedCache::new(cache),
        }
    }

    /// GET `url` and parse the body as JSON.
    pub async fn get(&self, url: &str, caching: Caching) -> Result<Option<Value>, IndexerError> {
        self.execute(url.to_string(), url, Request::Get, caching).await
    }

    /// POST a JSON body to `url` and parse the reply as JSON.
    pub async fn post(&self, url: &str, body: &Value, caching: Caching) -> Result<Option<Value>, IndexerError> {
        let key = format!("{url}#{body}");
        self.execute(key, url, Request::Post(body), caching).await
    }

    pub fn cache(&self) -> &BoundedCache<String, Value> {
        &self.cache
    }

    async fn execute(
        &self,
        key: String,
        url: &str,
        request: Request<'_>,
        caching: Caching,
    ) -> Result<Option<Value>, IndexerError> {
        let mut attempt = 0u32;
        loop {
            if caching == Caching::Cached {
                if let Some(hit) = self.cache.get(&key) {
                    tracing::trace!(url, "cache hit");
                    return Ok(Some(hit));
                }
            }

            let outcome = match request {
                Request::Get => self.transport.get(url).await,
                Request::Post(body) => self.transport.post_json(url, body).await,
            };

            let (reason, retry_after, rate_limited) = match outcome {
                Ok(reply) if reply.status == 404 || reply.status == 204 => return Ok(None),
                Ok(reply) if (200..300).contains(&reply.status) => {
                    let Some(value) = parse_body(url, &reply)? else {
                        return Ok(None);
                    };
                    if caching == Caching::Cached {
                        self.cache.set(key, value.clone());
                    }
                    return Ok(Some(value));
                }
                Ok(reply) if RetryPolicy::is_retryable_status(reply.status) => {
                    (format!("HTTP {}", reply.status), reply.retry_after, reply.status == 429)
                }
                Ok(reply) => {
                    return Err(IndexerError::Fetch {
                        url: url.to_string(),
                        reason: format!("HTTP {}: {}", reply.status, snippet(&reply.body)),
                    });
                }
                Err(e) => (e.to_string(), None, false),
            };

            match self.retry.next_delay(attempt, retry_after) {
                Some(delay) => {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        url,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    let attempts = attempt + 1;
                    tracing::error!(attempts, error = %reason, url, "max retries exceeded");
                    return Err(if rate_limited {
                        IndexerError::RateLimited { url: url.to_string(), attempts }
                    } else {
                        IndexerError::Fetch { url: url.to_string(), reason }
                    });
                }
            }
        }
    }
}

/// An empty 2xx body is treated like 204.
fn parse_body(url: &str, reply: &HttpReply) -> Result<Option<Value>, IndexerError> {
    if reply.body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&reply.body)
        .map(Some)
        .map_err(|e| IndexerError::Decode(format!("{url}: {e}")))
}

fn snippet(body: &str) -> &str {
    let end = body.char_indices().nth(200).map(|(i, _)| i).unwrap_or(body.len());
    &body[..end]
}

/// Join `base` and `path`, then append `query` form-encoded.
pub fn build_url(base: &str, path: &str, query: &[(&str, String)]) -> String {
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    if !query.is_empty() {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        url.push('?');
        url.push_str(&encoded);
    }
    url
}
