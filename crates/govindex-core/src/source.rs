//! The upstream read API every indexing component consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::contract::GovernanceStorage;
use crate::error::IndexerError;
use crate::operation::RawTransaction;
use crate::types::{BlockHead, ContractActivity, GlobalVotingPeriod, Voter};

/// Read access to chain history.
///
/// The production implementation (`govindex-tzkt::TzktClient`) routes every
/// call through a retrying, caching fetcher. Absence is `Ok(None)` or an
/// empty `Vec`; errors mean the upstream could not be read at all.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Current chain head.
    async fn head(&self) -> Result<BlockHead, IndexerError>;

    /// Timestamp of the block at `level`; `None` if not produced yet.
    async fn block_time(&self, level: u64) -> Result<Option<DateTime<Utc>>, IndexerError>;

    /// Target seconds between blocks under the current protocol.
    async fn time_between_blocks(&self) -> Result<u64, IndexerError>;

    /// All protocol-level voting epochs known to the upstream.
    async fn global_voting_periods(&self) -> Result<Vec<GlobalVotingPeriod>, IndexerError>;

    /// Registered voting power of `address` in epoch `global_index`.
    async fn voter(&self, global_index: u64, address: &str) -> Result<Option<Voter>, IndexerError>;

    /// First/last activity levels of a contract.
    async fn contract_activity(&self, address: &str) -> Result<Option<ContractActivity>, IndexerError>;

    /// Storage snapshot of a governance contract after block `level`.
    async fn contract_storage(&self, address: &str, level: u64) -> Result<Option<GovernanceStorage>, IndexerError>;

    /// Governance-entrypoint transactions targeting `address` within
    /// `[from_level, to_level]`, oldest first, at most `limit` rows.
    async fn governance_transactions(
        &self,
        address: &str,
        from_level: u64,
        to_level: u64,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, IndexerError>;

    /// Addresses delegating their voting rights to `baker`, as of `level`
    /// (on-chain view of the delegation contract).
    async fn delegators(&self, baker: &str, level: u64) -> Result<Vec<String>, IndexerError>;
}
