//! BatchIndexer: historical backfill, one sequential pipeline per contract.
//!
//! # Stages
//! `Start → FetchConfig → ComputePeriods → FetchTransactions → Classify → Persist → Done`
//!
//! Nothing is written before classification succeeds, so an aborted run
//! leaves the store as it was. Incremental runs restart one period before
//! the last recorded one so a trailing proposal gets its promotion resolved.
//!
//! Contracts are indexed concurrently; no ordering holds across contracts.
//!
//! With a shutdown signal attached, a run stops at the next stage boundary
//! or between two persisted records, never inside a write.

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use govindex_core::error::IndexerError;
use govindex_core::model::ContractConfig;
use govindex_core::operation::GovernanceOperation;

use crate::context::{ContractTarget, IndexerContext};

/// Pipeline stage of one contract's backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStage {
    Start,
    FetchConfig,
    ComputePeriods,
    FetchTransactions,
    Classify,
    Persist,
    Done,
}

impl std::fmt::Display for BatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::FetchConfig => write!(f, "fetch-config"),
            Self::ComputePeriods => write!(f, "compute-periods"),
            Self::FetchTransactions => write!(f, "fetch-transactions"),
            Self::Classify => write!(f, "classify"),
            Self::Persist => write!(f, "persist"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Summary of one contract's backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub contract: String,
    pub from_level: u64,
    pub to_level: u64,
    pub periods: usize,
    pub proposals: usize,
    pub promotions: usize,
    pub upvotes: usize,
    pub votes: usize,
    /// Records written / skipped after exhausting persistence retries.
    pub written: usize,
    pub skipped: usize,
}

pub struct BatchIndexer {
    ctx: IndexerContext,
    shutdown: Option<watch::Receiver<bool>>,
}

impl BatchIndexer {
    pub fn new(ctx: IndexerContext) -> Self {
        Self { ctx, shutdown: None }
    }

    /// Stop runs cleanly once `shutdown` turns `true`; they then fail with
    /// [`IndexerError::Interrupted`].
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn stopping(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn advance(&self, contract: &str, stage: &mut BatchStage, next: BatchStage) -> Result<(), IndexerError> {
        if self.stopping() {
            return Err(IndexerError::Interrupted);
        }
        enter(contract, stage, next);
        Ok(())
    }

    pub fn context(&self) -> &IndexerContext {
        &self.ctx
    }

    /// Index every target concurrently. Results keep the input order.
    pub async fn index_all(
        &self,
        targets: &[ContractTarget],
        from_start: bool,
    ) -> Vec<(String, Result<IndexReport, IndexerError>)> {
        join_all(targets.iter().map(|target| async move {
            (target.address.clone(), self.index_contract(target, from_start).await)
        }))
        .await
    }

    /// Backfill one contract, from its start level when `from_start` is set,
    /// otherwise from the stored checkpoint.
    pub async fn index_contract(&self, target: &ContractTarget, from_start: bool) -> Result<IndexReport, IndexerError> {
        let mut stage = BatchStage::Start;
        let result = self.run(target, from_start, &mut stage).await;
        match &result {
            Err(IndexerError::Interrupted) => {
                warn!(contract = %target.address, stage = %stage, "backfill interrupted")
            }
            Err(e) => {
                error!(contract = %target.address, stage = %stage, fatal = e.is_fatal(), error = %e, "backfill aborted")
            }
            Ok(_) => {}
        }
        result
    }

    async fn run(
        &self,
        target: &ContractTarget,
        from_start: bool,
        stage: &mut BatchStage,
    ) -> Result<IndexReport, IndexerError> {
        let address = target.address.as_str();
        self.advance(address, stage, BatchStage::Start)?;

        self.advance(address, stage, BatchStage::FetchConfig)?;
        let (config, activity) = self.ctx.load_contract(target).await?;
        let head = self.ctx.source.head().await?;
        let to_level = if config.active {
            head.level
        } else {
            activity.last_activity.min(head.level)
        };
        let from_level = self.resume_level(&config, from_start).await?;
        info!(contract = address, from_level, to_level, head = head.level, from_start, "backfill range");

        self.advance(address, stage, BatchStage::ComputePeriods)?;
        let periods = self.ctx.periods.compute(&config, from_level, to_level).await?;

        self.advance(address, stage, BatchStage::FetchTransactions)?;
        let page_size = self.ctx.settings.page_size;
        let raw = if from_level <= to_level {
            self.ctx
                .source
                .governance_transactions(address, from_level, to_level, page_size)
                .await?
        } else {
            Vec::new()
        };
        if raw.len() >= page_size {
            return Err(IndexerError::Consistency(format!(
                "{address}: transaction listing for levels {from_level}..={to_level} reached the page cap of {page_size}"
            )));
        }

        self.advance(address, stage, BatchStage::Classify)?;
        let mut ops: Vec<GovernanceOperation> = Vec::with_capacity(raw.len());
        for tx in &raw {
            match tx.decode() {
                Ok(Some(op)) => ops.push(op),
                Ok(None) => {}
                Err(e) => warn!(contract = address, hash = %tx.hash, error = %e, "undecodable operation skipped"),
            }
        }
        let batch = self.ctx.processor().process(&config, periods, &ops, head.level).await?;

        self.advance(address, stage, BatchStage::Persist)?;
        let outcome = match &self.shutdown {
            Some(shutdown) => self.ctx.gateway.persist_batch_until(&config, &batch, shutdown).await,
            None => self.ctx.gateway.persist_batch(&config, &batch).await,
        };
        if outcome.interrupted {
            return Err(IndexerError::Interrupted);
        }

        enter(address, stage, BatchStage::Done);
        let report = IndexReport {
            contract: address.to_string(),
            from_level,
            to_level,
            periods: batch.periods.len(),
            proposals: batch.proposals.len(),
            promotions: batch.promotions.len(),
            upvotes: batch.upvotes.len(),
            votes: batch.votes.len(),
            written: outcome.written,
            skipped: outcome.skipped,
        };
        info!(
            contract = address,
            operations = ops.len(),
            periods = report.periods,
            proposals = report.proposals,
            upvotes = report.upvotes,
            votes = report.votes,
            skipped = report.skipped,
            "backfill complete"
        );
        Ok(report)
    }

    async fn resume_level(&self, config: &ContractConfig, from_start: bool) -> Result<u64, IndexerError> {
        if from_start {
            return Ok(config.started_at_level);
        }
        Ok(match self.ctx.gateway.last_processed_period(&config.address).await? {
            Some(last) => config.period_start(last.contract_voting_index.saturating_sub(1)),
            None => config.started_at_level,
        })
    }
}

fn enter(contract: &str, stage: &mut BatchStage, next: BatchStage) {
    *stage = next;
    info!(contract, stage = %next, "backfill stage");
}
