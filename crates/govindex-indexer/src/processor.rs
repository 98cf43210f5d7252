//! OperationProcessor: turns governance operations into persisted records.
//!
//! Per entrypoint:
//! - `new_proposal` adds the hash to the period named by on-chain storage,
//!   emits one upvote per resolved voter, creates the proposal with their
//!   summed power, then tries to resolve the promotion of the next period.
//! - `upvote_proposal` emits one upvote per resolved voter and bumps the
//!   proposal's total when the proposal is in the same batch.
//! - `vote` reads the promotion candidate and running tallies from storage at
//!   the vote's level and emits one vote per resolved voter.
//!
//! Periods missing from the supplied skeleton are built on demand.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use govindex_core::contract::GovernanceStorage;
use govindex_core::error::IndexerError;
use govindex_core::model::{
    Ballot, ContractConfig, GovernanceBatch, Period, Promotion, Proposal, Upvote, Vote,
};
use govindex_core::operation::{GovernanceOperation, OperationMeta, ProposalPayload};
use govindex_core::source::ChainSource;
use govindex_core::types::{total_power, Voter};

use crate::delegation::DelegationResolver;
use crate::periods::PeriodCalculator;

#[derive(Default)]
struct BatchState {
    periods: BTreeMap<u64, Period>,
    proposals: Vec<Proposal>,
    promotions: Vec<Promotion>,
    upvotes: Vec<Upvote>,
    votes: Vec<Vote>,
}

impl BatchState {
    fn proposal_mut(&mut self, hash: &str) -> Option<&mut Proposal> {
        self.proposals.iter_mut().find(|p| p.proposal_hash == hash)
    }

    fn merge_promotion(&mut self, incoming: Promotion) {
        match self
            .promotions
            .iter_mut()
            .find(|p| p.proposal_hash == incoming.proposal_hash)
        {
            Some(existing) => {
                existing.merge_from(&incoming);
            }
            None => self.promotions.push(incoming),
        }
    }

    fn into_batch(self) -> GovernanceBatch {
        GovernanceBatch {
            periods: self.periods.into_values().collect(),
            proposals: self.proposals,
            promotions: self.promotions,
            upvotes: self.upvotes,
            votes: self.votes,
        }
    }
}

fn upvote_rows(config: &ContractConfig, index: u64, hash: &str, meta: &OperationMeta, voters: &[Voter]) -> Vec<Upvote> {
    voters
        .iter()
        .map(|v| Upvote {
            contract_address: config.address.clone(),
            contract_period_index: index,
            proposal_hash: hash.to_string(),
            level: meta.level,
            time: meta.timestamp,
            transaction_hash: meta.hash.clone(),
            baker: v.address.clone(),
            alias: v.alias.clone(),
            voting_power: v.voting_power,
            sender: meta.sender.clone(),
        })
        .collect()
}

pub struct OperationProcessor {
    source: Arc<dyn ChainSource>,
    periods: PeriodCalculator,
    delegation: Arc<DelegationResolver>,
}

impl OperationProcessor {
    pub fn new(source: Arc<dyn ChainSource>, periods: PeriodCalculator, delegation: Arc<DelegationResolver>) -> Self {
        Self {
            source,
            periods,
            delegation,
        }
    }

    /// Classify `ops` (oldest first) for one contract on top of `periods`.
    ///
    /// `head_level` bounds promotion lookups: a promotion is only resolved
    /// once the period that would hold it has ended.
    pub async fn process(
        &self,
        config: &ContractConfig,
        periods: Vec<Period>,
        ops: &[GovernanceOperation],
        head_level: u64,
    ) -> Result<GovernanceBatch, IndexerError> {
        let mut state = BatchState::default();
        for period in periods {
            state.periods.insert(period.contract_voting_index, period);
        }

        for op in ops {
            let meta = op.meta();
            if meta.contract != config.address {
                debug!(contract = %config.address, target = %meta.contract, hash = %meta.hash, "operation for another contract skipped");
                continue;
            }
            debug!(
                contract = %config.address,
                entrypoint = op.entrypoint(),
                level = meta.level,
                hash = %meta.hash,
                "classifying operation"
            );
            match op {
                GovernanceOperation::NewProposal { meta, payload } => {
                    self.new_proposal(config, &mut state, meta, payload, head_level).await?
                }
                GovernanceOperation::Upvote { meta, payload } => self.upvote(config, &mut state, meta, payload).await?,
                GovernanceOperation::Vote { meta, ballot } => self.vote(config, &mut state, meta, *ballot).await?,
            }
        }
        Ok(state.into_batch())
    }

    async fn new_proposal(
        &self,
        config: &ContractConfig,
        state: &mut BatchState,
        meta: &OperationMeta,
        payload: &ProposalPayload,
        head_level: u64,
    ) -> Result<(), IndexerError> {
        let hash = payload.key();
        let storage = self.storage_at(config, meta.level).await?;
        let index = storage.period_index().ok_or_else(|| {
            IndexerError::Consistency(format!(
                "new_proposal {} on {}: storage at level {} has no voting context",
                meta.hash, config.address, meta.level
            ))
        })?;

        self.period_mut(state, config, index).await?.add_proposal_hash(&hash);

        let voters = self.delegation.resolve_at_level(&meta.sender, meta.level).await?;
        let power = total_power(&voters);
        state.upvotes.extend(upvote_rows(config, index, &hash, meta, &voters));

        match state.proposal_mut(&hash) {
            Some(existing) => existing.upvotes += power,
            None => state.proposals.push(Proposal {
                contract_address: config.address.clone(),
                proposal_hash: hash.clone(),
                contract_period_index: index,
                level: meta.level,
                time: meta.timestamp,
                transaction_hash: meta.hash.clone(),
                proposer: meta.sender.clone(),
                alias: meta.sender_alias.clone(),
                upvotes: power,
            }),
        }

        let next = index + 1;
        let already_promoted = state.periods.get(&next).is_some_and(|p| p.promotion_hash.is_some());
        if already_promoted {
            return Ok(());
        }
        if let Some(promotion) = self.resolve_promotion(config, index, head_level).await? {
            self.period_mut(state, config, next)
                .await?
                .set_promotion_hash(&promotion.proposal_hash);
            state.merge_promotion(promotion);
        }
        Ok(())
    }

    async fn upvote(
        &self,
        config: &ContractConfig,
        state: &mut BatchState,
        meta: &OperationMeta,
        payload: &ProposalPayload,
    ) -> Result<(), IndexerError> {
        let hash = payload.key();
        let index = config.period_index(meta.level).ok_or_else(|| {
            IndexerError::Consistency(format!(
                "upvote {} at level {} precedes {} start level {}",
                meta.hash, meta.level, config.address, config.started_at_level
            ))
        })?;

        let voters = self.delegation.resolve_at_level(&meta.sender, meta.level).await?;
        if let Some(proposal) = state.proposal_mut(&hash) {
            proposal.upvotes += total_power(&voters);
        }
        state.upvotes.extend(upvote_rows(config, index, &hash, meta, &voters));
        Ok(())
    }

    async fn vote(
        &self,
        config: &ContractConfig,
        state: &mut BatchState,
        meta: &OperationMeta,
        ballot: Ballot,
    ) -> Result<(), IndexerError> {
        let storage = self.storage_at(config, meta.level).await?;
        let (index, promotion) = storage
            .promotion()
            .map(|(index, p)| (index, p.to_promotion(&config.address, index)))
            .ok_or_else(|| {
                IndexerError::Consistency(format!(
                    "vote {} on {}: contract is not in a promotion period at level {}",
                    meta.hash, config.address, meta.level
                ))
            })?;

        let voters = self.delegation.resolve_at_level(&meta.sender, meta.level).await?;
        state.votes.extend(voters.iter().map(|v| Vote {
            contract_address: config.address.clone(),
            contract_period_index: index,
            proposal_hash: promotion.proposal_hash.clone(),
            level: meta.level,
            time: meta.timestamp,
            transaction_hash: meta.hash.clone(),
            baker: v.address.clone(),
            alias: v.alias.clone(),
            voting_power: v.voting_power,
            vote: ballot,
            sender: meta.sender.clone(),
        }));

        self.period_mut(state, config, index)
            .await?
            .set_promotion_hash(&promotion.proposal_hash);
        state.merge_promotion(promotion);
        Ok(())
    }

    /// Promotion skeleton for the period after `proposal_index`, read from
    /// storage at that period's last level.
    ///
    /// `Ok(None)` if that period has not ended by `head_level` or storage
    /// shows no promotion. A promotion for any other period index is a
    /// consistency violation.
    pub async fn resolve_promotion(
        &self,
        config: &ContractConfig,
        proposal_index: u64,
        head_level: u64,
    ) -> Result<Option<Promotion>, IndexerError> {
        let next = proposal_index + 1;
        let check_level = config.period_end(next);
        if check_level > head_level {
            debug!(contract = %config.address, next, check_level, head_level, "promotion not decided yet");
            return Ok(None);
        }

        let storage = self.storage_at(config, check_level).await?;
        let Some((index, state)) = storage.promotion() else {
            return Ok(None);
        };
        if index != next {
            return Err(IndexerError::Consistency(format!(
                "{}: storage at level {check_level} reports promotion period {index}, expected {next}",
                config.address
            )));
        }
        let hash = state.winner_candidate.key();
        debug!(contract = %config.address, period = next, hash = %hash, "promotion resolved");
        Ok(Some(Promotion::skeleton(config.address.clone(), hash, next)))
    }

    async fn storage_at(&self, config: &ContractConfig, level: u64) -> Result<GovernanceStorage, IndexerError> {
        self.source
            .contract_storage(&config.address, level)
            .await?
            .ok_or_else(|| IndexerError::Consistency(format!("{} has no storage at level {level}", config.address)))
    }

    async fn period_mut<'s>(
        &self,
        state: &'s mut BatchState,
        config: &ContractConfig,
        index: u64,
    ) -> Result<&'s mut Period, IndexerError> {
        if !state.periods.contains_key(&index) {
            let period = self.periods.skeleton(config, index).await?;
            state.periods.insert(index, period);
        }
        state
            .periods
            .get_mut(&index)
            .ok_or_else(|| IndexerError::Other(format!("period {index} vanished from batch")))
    }
}
