//! govindex-tzkt: upstream access for GovIndex.
//!
//! - [`ResilientFetcher`]: retry, rate-limit compliance and response caching
//! - [`RetryPolicy`]: explicit, unit-testable backoff schedule
//! - [`HttpTransport`]: the network seam (reqwest in production)
//! - [`TzktClient`]: `ChainSource` over the TzKT REST API and a node RPC view

pub mod api;
pub mod fetcher;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{TzktClient, TzktConfig, DEFAULT_CHAIN_ID};
pub use fetcher::{build_url, Caching, ResilientFetcher};
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::{HttpReply, HttpTransport, ReqwestTransport, TransportError};
