//! Error types for the govindex pipeline.

use thiserror::Error;

/// Errors that can occur while indexing governance activity.
///
/// Absence (HTTP 404/204, "no voter found", "no voting period found") is
/// never an error; it surfaces as `Ok(None)` or an empty collection.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Upstream request failed after every retry attempt.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Upstream kept answering HTTP 429 until the attempt ceiling.
    #[error("rate limited by upstream after {attempts} attempts: {url}")]
    RateLimited { url: String, attempts: u32 },

    /// Upstream payload did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Upstream data contradicts itself or the indexer's expectations.
    /// Retrying cannot fix these.
    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Live push-channel connection or protocol failure.
    #[error("live channel error: {0}")]
    Channel(String),

    /// Shutdown was requested before the run finished.
    #[error("interrupted by shutdown")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for errors that abort a run and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::Config(_))
    }

    /// Returns `true` for errors a later run may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::RateLimited { .. } | Self::Storage(_) | Self::Channel(_)
        )
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(IndexerError::Consistency("x".into()).is_fatal());
        assert!(!IndexerError::Consistency("x".into()).is_transient());
        assert!(IndexerError::RateLimited { url: "u".into(), attempts: 5 }.is_transient());
        assert!(!IndexerError::Decode("bad".into()).is_fatal());
        assert!(!IndexerError::Interrupted.is_fatal());
        assert!(!IndexerError::Interrupted.is_transient());
    }

    #[test]
    fn fetch_error_names_url() {
        let e = IndexerError::Fetch {
            url: "https://api.tzkt.io/v1/head".into(),
            reason: "HTTP 502".into(),
        };
        assert!(e.to_string().contains("https://api.tzkt.io/v1/head"));
    }
}
