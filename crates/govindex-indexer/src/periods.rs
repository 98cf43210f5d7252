//! PeriodCalculator: the level/time skeleton of a contract's voting periods.
//!
//! For each period touching a level range it resolves the start and end block
//! timestamps and samples total voting power at `level_start`. Proposal and
//! promotion content is left empty for the processor to fill in.
//!
//! The last period of an active contract usually ends beyond the chain head;
//! its `date_end` is then estimated from the head and the protocol's block
//! time, and refined on a later run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use govindex_core::error::IndexerError;
use govindex_core::model::{ContractConfig, Period};
use govindex_core::source::ChainSource;
use govindex_core::types::{find_voting_period, BlockHead, GlobalVotingPeriod};

/// Chain facts shared by every period of one computation.
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub head: BlockHead,
    pub time_between_blocks: u64,
    pub voting_periods: Vec<GlobalVotingPeriod>,
}

/// Timestamp of `level` extrapolated from `head` at `time_between_blocks` seconds per block.
pub fn estimate_time(head: &BlockHead, level: u64, time_between_blocks: u64) -> DateTime<Utc> {
    let blocks = level as i64 - head.level as i64;
    head.timestamp + chrono::Duration::seconds(blocks * time_between_blocks as i64)
}

#[derive(Clone)]
pub struct PeriodCalculator {
    source: Arc<dyn ChainSource>,
}

impl PeriodCalculator {
    pub fn new(source: Arc<dyn ChainSource>) -> Self {
        Self { source }
    }

    pub async fn snapshot(&self) -> Result<ChainSnapshot, IndexerError> {
        Ok(ChainSnapshot {
            head: self.source.head().await?,
            time_between_blocks: self.source.time_between_blocks().await?,
            voting_periods: self.source.global_voting_periods().await?,
        })
    }

    /// Every period touching `[from_level, to_level]`, in index order.
    pub async fn compute(
        &self,
        config: &ContractConfig,
        from_level: u64,
        to_level: u64,
    ) -> Result<Vec<Period>, IndexerError> {
        let indices = config.period_indices(from_level, to_level);
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot().await?;
        let mut periods = Vec::new();
        for index in indices {
            periods.push(self.build_period(config, index, &snapshot).await?);
        }
        debug!(
            contract = %config.address,
            from_level,
            to_level,
            count = periods.len(),
            "periods computed"
        );
        Ok(periods)
    }

    /// One period skeleton against a fresh chain snapshot.
    pub async fn skeleton(&self, config: &ContractConfig, index: u64) -> Result<Period, IndexerError> {
        let snapshot = self.snapshot().await?;
        self.build_period(config, index, &snapshot).await
    }

    pub async fn build_period(
        &self,
        config: &ContractConfig,
        index: u64,
        snapshot: &ChainSnapshot,
    ) -> Result<Period, IndexerError> {
        let level_start = config.period_start(index);
        let level_end = config.period_end(index);

        let total_voting_power = match find_voting_period(&snapshot.voting_periods, level_start) {
            Some(epoch) => epoch.total_voting_power,
            None => {
                warn!(
                    contract = %config.address,
                    index,
                    level_start,
                    "no global voting period covers period start, total voting power set to 0"
                );
                0
            }
        };

        Ok(Period {
            contract_address: config.address.clone(),
            contract_voting_index: index,
            level_start,
            level_end,
            date_start: self.level_time(level_start, snapshot).await?,
            date_end: self.level_time(level_end, snapshot).await?,
            total_voting_power,
            proposal_hashes: Vec::new(),
            promotion_hash: None,
        })
    }

    async fn level_time(&self, level: u64, snapshot: &ChainSnapshot) -> Result<DateTime<Utc>, IndexerError> {
        if level <= snapshot.head.level {
            if let Some(time) = self.source.block_time(level).await? {
                return Ok(time);
            }
            debug!(level, "block time missing, estimating");
        }
        Ok(estimate_time(&snapshot.head, level, snapshot.time_between_blocks))
    }
}
