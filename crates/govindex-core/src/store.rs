//! Durable storage contract for governance records.
//!
//! Every write is an idempotent upsert keyed by the record's natural key;
//! conflicts are resolved with the `merge_from` rules in [`crate::model`].

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::model::{ContractConfig, Period, Promotion, Proposal, Upvote, Vote};

/// Trait for storing and loading governance state.
///
/// Implementations include `MemoryStore`, `SqliteStore` and `PostgresStore`
/// in `govindex-storage`.
#[async_trait]
pub trait GovernanceStore: Send + Sync {
    /// Insert or update a contract; only `active` changes on conflict.
    async fn upsert_contract(&self, contract: &ContractConfig) -> Result<(), IndexerError>;

    /// Keyed by `(contract_address, contract_voting_index)`.
    async fn upsert_period(&self, period: &Period) -> Result<(), IndexerError>;

    /// Keyed by `(contract_address, proposal_hash)`. After the write the
    /// stored `upvotes` equals the sum of that proposal's upvote rows.
    async fn upsert_proposal(&self, proposal: &Proposal) -> Result<(), IndexerError>;

    /// Keyed by `(contract_address, proposal_hash)`.
    async fn upsert_promotion(&self, promotion: &Promotion) -> Result<(), IndexerError>;

    /// Keyed by `(transaction_hash, baker)`; refreshes the proposal's upvote total.
    async fn upsert_upvote(&self, upvote: &Upvote) -> Result<(), IndexerError>;

    /// Keyed by `(transaction_hash, baker)`.
    async fn upsert_vote(&self, vote: &Vote) -> Result<(), IndexerError>;

    /// The resumption checkpoint: the period with the highest index.
    async fn last_processed_period(&self, contract: &str) -> Result<Option<Period>, IndexerError>;

    async fn period(&self, contract: &str, index: u64) -> Result<Option<Period>, IndexerError>;

    async fn contract(&self, address: &str) -> Result<Option<ContractConfig>, IndexerError>;

    async fn periods(&self, contract: &str) -> Result<Vec<Period>, IndexerError>;

    async fn proposals(&self, contract: &str) -> Result<Vec<Proposal>, IndexerError>;

    async fn promotions(&self, contract: &str) -> Result<Vec<Promotion>, IndexerError>;

    async fn upvotes(&self, contract: &str) -> Result<Vec<Upvote>, IndexerError>;

    async fn votes(&self, contract: &str) -> Result<Vec<Vote>, IndexerError>;

    /// Re-establish the underlying connection after a failed write.
    async fn reconnect(&self) -> Result<(), IndexerError> {
        Ok(())
    }
}
