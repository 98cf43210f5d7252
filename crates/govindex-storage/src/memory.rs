//! In-memory storage backend.
//!
//! Stores governance records in RAM with the same merge rules as the SQL
//! backends. Useful for testing and dry runs that don't need persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use govindex_core::error::IndexerError;
use govindex_core::model::{ContractConfig, Period, Promotion, Proposal, Upvote, Vote};
use govindex_core::store::GovernanceStore;

type ContractKey = (String, u64);
type HashKey = (String, String);

#[derive(Default)]
struct State {
    contracts: HashMap<String, ContractConfig>,
    periods: BTreeMap<ContractKey, Period>,
    proposals: BTreeMap<HashKey, Proposal>,
    promotions: BTreeMap<HashKey, Promotion>,
    /// Keyed by `(transaction_hash, baker)`.
    upvotes: BTreeMap<HashKey, Upvote>,
    votes: BTreeMap<HashKey, Vote>,
}

impl State {
    fn refresh_upvote_total(&mut self, contract: &str, hash: &str) {
        let sum: u64 = self
            .upvotes
            .values()
            .filter(|u| u.contract_address == contract && u.proposal_hash == hash)
            .map(|u| u.voting_power)
            .sum();
        if let Some(p) = self.proposals.get_mut(&(contract.to_string(), hash.to_string())) {
            p.upvotes = p.upvotes.max(sum);
        }
    }
}

/// In-memory governance store. All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GovernanceStore for MemoryStore {
    async fn upsert_contract(&self, contract: &ContractConfig) -> Result<(), IndexerError> {
        let mut state = self.state();
        state
            .contracts
            .entry(contract.address.clone())
            .and_modify(|stored| stored.active = contract.active)
            .or_insert_with(|| contract.clone());
        Ok(())
    }

    async fn upsert_period(&self, period: &Period) -> Result<(), IndexerError> {
        let key = (period.contract_address.clone(), period.contract_voting_index);
        self.state()
            .periods
            .entry(key)
            .and_modify(|stored| stored.merge_from(period))
            .or_insert_with(|| period.clone());
        Ok(())
    }

    async fn upsert_proposal(&self, proposal: &Proposal) -> Result<(), IndexerError> {
        let key = (proposal.contract_address.clone(), proposal.proposal_hash.clone());
        let mut state = self.state();
        state
            .proposals
            .entry(key)
            .and_modify(|stored| stored.merge_from(proposal))
            .or_insert_with(|| proposal.clone());
        state.refresh_upvote_total(&proposal.contract_address, &proposal.proposal_hash);
        Ok(())
    }

    async fn upsert_promotion(&self, promotion: &Promotion) -> Result<(), IndexerError> {
        let key = (promotion.contract_address.clone(), promotion.proposal_hash.clone());
        self.state()
            .promotions
            .entry(key)
            .and_modify(|stored| {
                if !stored.merge_from(promotion) {
                    debug!(
                        contract = %promotion.contract_address,
                        hash = %promotion.proposal_hash,
                        "stale promotion snapshot ignored"
                    );
                }
            })
            .or_insert_with(|| promotion.clone());
        Ok(())
    }

    async fn upsert_upvote(&self, upvote: &Upvote) -> Result<(), IndexerError> {
        let key = (upvote.transaction_hash.clone(), upvote.baker.clone());
        let mut state = self.state();
        state.upvotes.entry(key).or_insert_with(|| upvote.clone());
        state.refresh_upvote_total(&upvote.contract_address, &upvote.proposal_hash);
        Ok(())
    }

    async fn upsert_vote(&self, vote: &Vote) -> Result<(), IndexerError> {
        let key = (vote.transaction_hash.clone(), vote.baker.clone());
        self.state().votes.entry(key).or_insert_with(|| vote.clone());
        Ok(())
    }

    async fn last_processed_period(&self, contract: &str) -> Result<Option<Period>, IndexerError> {
        Ok(self
            .state()
            .periods
            .values()
            .filter(|p| p.contract_address == contract)
            .max_by_key(|p| p.contract_voting_index)
            .cloned())
    }

    async fn period(&self, contract: &str, index: u64) -> Result<Option<Period>, IndexerError> {
        Ok(self.state().periods.get(&(contract.to_string(), index)).cloned())
    }

    async fn contract(&self, address: &str) -> Result<Option<ContractConfig>, IndexerError> {
        Ok(self.state().contracts.get(address).cloned())
    }

    async fn periods(&self, contract: &str) -> Result<Vec<Period>, IndexerError> {
        Ok(self
            .state()
            .periods
            .values()
            .filter(|p| p.contract_address == contract)
            .cloned()
            .collect())
    }

    async fn proposals(&self, contract: &str) -> Result<Vec<Proposal>, IndexerError> {
        let mut rows: Vec<Proposal> = self
            .state()
            .proposals
            .values()
            .filter(|p| p.contract_address == contract)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.level, &a.proposal_hash).cmp(&(b.level, &b.proposal_hash)));
        Ok(rows)
    }

    async fn promotions(&self, contract: &str) -> Result<Vec<Promotion>, IndexerError> {
        let mut rows: Vec<Promotion> = self
            .state()
            .promotions
            .values()
            .filter(|p| p.contract_address == contract)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.contract_period_index);
        Ok(rows)
    }

    async fn upvotes(&self, contract: &str) -> Result<Vec<Upvote>, IndexerError> {
        let mut rows: Vec<Upvote> = self
            .state()
            .upvotes
            .values()
            .filter(|u| u.contract_address == contract)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.level, &a.transaction_hash, &a.baker).cmp(&(b.level, &b.transaction_hash, &b.baker))
        });
        Ok(rows)
    }

    async fn votes(&self, contract: &str) -> Result<Vec<Vote>, IndexerError> {
        let mut rows: Vec<Vote> = self
            .state()
            .votes
            .values()
            .filter(|v| v.contract_address == contract)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.level, &a.transaction_hash, &a.baker).cmp(&(b.level, &b.transaction_hash, &b.baker))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::conformance;

    #[tokio::test]
    async fn contract_only_updates_active() {
        conformance::contract_only_updates_active(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn period_upsert_is_idempotent() {
        conformance::period_upsert_is_idempotent(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn period_hashes_union_and_promotion_set_once() {
        conformance::period_hashes_union_and_promotion_set_once(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn last_processed_period_is_highest_index() {
        conformance::last_processed_period_is_highest_index(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn concurrent_first_writes_keep_every_hash() {
        conformance::concurrent_first_writes_keep_every_hash(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn upvotes_converge_to_row_sum() {
        conformance::upvotes_converge_to_row_sum(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn proposal_alias_refreshes() {
        conformance::proposal_alias_refreshes(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn promotion_tallies_never_regress() {
        conformance::promotion_tallies_never_regress(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn votes_are_append_only() {
        conformance::votes_are_append_only(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn contracts_are_isolated() {
        let store = MemoryStore::new();
        let mut other = crate::fixtures::period(0);
        other.contract_address = "KT1other".into();
        store.upsert_period(&crate::fixtures::period(0)).await.unwrap();
        store.upsert_period(&other).await.unwrap();
        assert_eq!(store.periods("KT1other").await.unwrap().len(), 1);
        assert_eq!(store.periods(crate::fixtures::CONTRACT).await.unwrap().len(), 1);
    }
}
