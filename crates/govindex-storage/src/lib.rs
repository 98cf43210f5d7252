//! govindex-storage: pluggable storage backends for GovIndex.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! [`PersistenceGateway`] wraps any backend with write retries and reconnects.
//! [`open_store`] picks a backend from a database URL.

use std::sync::Arc;

use govindex_core::error::IndexerError;
use govindex_core::store::GovernanceStore;

pub mod gateway;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(test)]
mod fixtures;

pub use gateway::{GatewayConfig, PersistOutcome, PersistenceGateway, Record};
pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStore};

/// Schema version recorded in `schema_migrations` by the SQL backends.
pub const SCHEMA_VERSION: i64 = 1;

/// Open a store from a database URL.
///
/// - `memory`: [`MemoryStore`]
/// - `sqlite::memory:`: in-memory SQLite
/// - `sqlite:<path>` / `sqlite://<path>`: file-backed SQLite
/// - `postgres://…` / `postgresql://…`: PostgreSQL
pub async fn open_store(database_url: &str) -> Result<Arc<dyn GovernanceStore>, IndexerError> {
    let url = database_url.trim();
    if url == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }

    if let Some(path) = url.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            let path = path.trim_start_matches("//");
            let store = if path == ":memory:" || path.is_empty() {
                SqliteStore::in_memory().await?
            } else {
                SqliteStore::open(path).await?
            };
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = path;
            return Err(IndexerError::Config("built without the `sqlite` feature".into()));
        }
    }

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        {
            return Ok(Arc::new(PostgresStore::connect(url).await?));
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err(IndexerError::Config("built without the `postgres` feature".into()));
        }
    }

    Err(IndexerError::Config(format!("unsupported database url: {database_url}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_memory_store() {
        let store = open_store("memory").await.unwrap();
        assert!(store.last_processed_period("KT1x").await.unwrap().is_none());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn opens_in_memory_sqlite() {
        let store = open_store("sqlite::memory:").await.unwrap();
        assert!(store.periods("KT1x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_unknown_scheme() {
        let err = open_store("mysql://localhost/db").await.err().unwrap();
        assert!(matches!(err, IndexerError::Config(_)));
    }
}
