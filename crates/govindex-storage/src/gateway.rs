//! PersistenceGateway: the single writer and reader of durable governance state.
//!
//! Writes are retried a fixed number of times with a store reconnect between
//! attempts. A write that still fails is logged and skipped; every upsert is
//! idempotent, so the next incremental run recovers it. Reads propagate errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use govindex_core::error::IndexerError;
use govindex_core::model::{
    ContractConfig, GovernanceBatch, Period, Promotion, Proposal, Upvote, Vote,
};
use govindex_core::store::GovernanceStore;

/// Retry settings for gateway writes.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Attempts per record, including the first (default: 3).
    pub max_attempts: u32,
    /// Pause before each retry; doubles per attempt (default: 500ms).
    pub backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// A borrowed record headed for the store.
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    Contract(&'a ContractConfig),
    Period(&'a Period),
    Proposal(&'a Proposal),
    Promotion(&'a Promotion),
    Upvote(&'a Upvote),
    Vote(&'a Vote),
}

impl Record<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Contract(_) => "contract",
            Self::Period(_) => "period",
            Self::Proposal(_) => "proposal",
            Self::Promotion(_) => "promotion",
            Self::Upvote(_) => "upvote",
            Self::Vote(_) => "vote",
        }
    }

    /// Natural key, for log lines.
    pub fn key(&self) -> String {
        match self {
            Self::Contract(c) => c.address.clone(),
            Self::Period(p) => format!("{}/{}", p.contract_address, p.contract_voting_index),
            Self::Proposal(p) => format!("{}/{}", p.contract_address, p.proposal_hash),
            Self::Promotion(p) => format!("{}/{}", p.contract_address, p.proposal_hash),
            Self::Upvote(u) => format!("{}/{}", u.transaction_hash, u.baker),
            Self::Vote(v) => format!("{}/{}", v.transaction_hash, v.baker),
        }
    }

    async fn apply(&self, store: &dyn GovernanceStore) -> Result<(), IndexerError> {
        match *self {
            Self::Contract(c) => store.upsert_contract(c).await,
            Self::Period(p) => store.upsert_period(p).await,
            Self::Proposal(p) => store.upsert_proposal(p).await,
            Self::Promotion(p) => store.upsert_promotion(p).await,
            Self::Upvote(u) => store.upsert_upvote(u).await,
            Self::Vote(v) => store.upsert_vote(v).await,
        }
    }
}

/// Outcome of [`PersistenceGateway::persist_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub written: usize,
    pub skipped: usize,
    /// Shutdown was requested before every record was written.
    pub interrupted: bool,
}

pub struct PersistenceGateway {
    store: Arc<dyn GovernanceStore>,
    config: GatewayConfig,
    skipped: AtomicU64,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn GovernanceStore>, config: GatewayConfig) -> Self {
        Self {
            store,
            config,
            skipped: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn GovernanceStore> {
        &self.store
    }

    /// Records skipped after exhausting retries since startup.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Write one record. Returns `false` when it was skipped.
    pub async fn write(&self, record: Record<'_>) -> bool {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match record.apply(self.store.as_ref()).await {
                Ok(()) => return true,
                Err(e) => e,
            };
            attempt += 1;
            if attempt >= attempts {
                error!(
                    kind = record.kind(),
                    key = %record.key(),
                    attempts,
                    error = %err,
                    "persist failed, skipping record"
                );
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return false;
            }

            let delay = self.config.backoff * 2u32.saturating_pow(attempt - 1);
            warn!(
                kind = record.kind(),
                key = %record.key(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "persist failed, reconnecting"
            );
            tokio::time::sleep(delay).await;
            if let Err(e) = self.store.reconnect().await {
                warn!(error = %e, "store reconnect failed");
            }
        }
    }

    /// Persist a classified batch in dependency order: contract, periods,
    /// upvotes, proposals, promotions, votes.
    pub async fn persist_batch(&self, contract: &ContractConfig, batch: &GovernanceBatch) -> PersistOutcome {
        self.persist(contract, batch, None).await
    }

    /// [`persist_batch`](Self::persist_batch), stopping between records once
    /// `shutdown` turns `true`. A record already being written is finished.
    pub async fn persist_batch_until(
        &self,
        contract: &ContractConfig,
        batch: &GovernanceBatch,
        shutdown: &watch::Receiver<bool>,
    ) -> PersistOutcome {
        self.persist(contract, batch, Some(shutdown)).await
    }

    async fn persist(
        &self,
        contract: &ContractConfig,
        batch: &GovernanceBatch,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> PersistOutcome {
        let records = std::iter::once(Record::Contract(contract))
            .chain(batch.periods.iter().map(Record::Period))
            .chain(batch.upvotes.iter().map(Record::Upvote))
            .chain(batch.proposals.iter().map(Record::Proposal))
            .chain(batch.promotions.iter().map(Record::Promotion))
            .chain(batch.votes.iter().map(Record::Vote));

        let mut outcome = PersistOutcome::default();
        for record in records {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                outcome.interrupted = true;
                info!(
                    contract = %contract.address,
                    written = outcome.written,
                    "shutdown requested, batch left partially written"
                );
                break;
            }
            if self.write(record).await {
                outcome.written += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        debug!(
            contract = %contract.address,
            written = outcome.written,
            skipped = outcome.skipped,
            "batch persisted"
        );
        outcome
    }

    pub async fn upsert_contract(&self, contract: &ContractConfig) -> bool {
        self.write(Record::Contract(contract)).await
    }

    pub async fn upsert_period(&self, period: &Period) -> bool {
        self.write(Record::Period(period)).await
    }

    pub async fn upsert_proposal(&self, proposal: &Proposal) -> bool {
        self.write(Record::Proposal(proposal)).await
    }

    pub async fn upsert_promotion(&self, promotion: &Promotion) -> bool {
        self.write(Record::Promotion(promotion)).await
    }

    pub async fn upsert_upvote(&self, upvote: &Upvote) -> bool {
        self.write(Record::Upvote(upvote)).await
    }

    pub async fn upsert_vote(&self, vote: &Vote) -> bool {
        self.write(Record::Vote(vote)).await
    }

    // ─── Reads ────────────────────────────────────────────────────────────────

    pub async fn last_processed_period(&self, contract: &str) -> Result<Option<Period>, IndexerError> {
        self.store.last_processed_period(contract).await
    }

    pub async fn period(&self, contract: &str, index: u64) -> Result<Option<Period>, IndexerError> {
        self.store.period(contract, index).await
    }

    pub async fn contract(&self, address: &str) -> Result<Option<ContractConfig>, IndexerError> {
        self.store.contract(address).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, CONTRACT};
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Fails the first `failures` writes, then delegates to a memory store.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
        reconnects: AtomicU32,
        writes: AtomicU32,
        /// Flipped to `true` once `writes` reaches the paired count.
        stop_after: Option<(u32, watch::Sender<bool>)>,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicU32::new(failures),
                reconnects: AtomicU32::new(0),
                writes: AtomicU32::new(0),
                stop_after: None,
            }
        }

        fn stopping_after(writes: u32, tx: watch::Sender<bool>) -> Self {
            Self {
                stop_after: Some((writes, tx)),
                ..Self::new(0)
            }
        }

        fn trip(&self) -> Result<(), IndexerError> {
            let written = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, tx)) = &self.stop_after {
                if written == *after {
                    let _ = tx.send(true);
                }
            }
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(IndexerError::Storage("connection reset".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GovernanceStore for FlakyStore {
        async fn upsert_contract(&self, c: &ContractConfig) -> Result<(), IndexerError> {
            self.trip()?;
            self.inner.upsert_contract(c).await
        }
        async fn upsert_period(&self, p: &Period) -> Result<(), IndexerError> {
            self.trip()?;
            self.inner.upsert_period(p).await
        }
        async fn upsert_proposal(&self, p: &Proposal) -> Result<(), IndexerError> {
            self.trip()?;
            self.inner.upsert_proposal(p).await
        }
        async fn upsert_promotion(&self, p: &Promotion) -> Result<(), IndexerError> {
            self.trip()?;
            self.inner.upsert_promotion(p).await
        }
        async fn upsert_upvote(&self, u: &Upvote) -> Result<(), IndexerError> {
            self.trip()?;
            self.inner.upsert_upvote(u).await
        }
        async fn upsert_vote(&self, v: &Vote) -> Result<(), IndexerError> {
            self.trip()?;
            self.inner.upsert_vote(v).await
        }
        async fn last_processed_period(&self, contract: &str) -> Result<Option<Period>, IndexerError> {
            self.inner.last_processed_period(contract).await
        }
        async fn period(&self, contract: &str, index: u64) -> Result<Option<Period>, IndexerError> {
            self.inner.period(contract, index).await
        }
        async fn contract(&self, address: &str) -> Result<Option<ContractConfig>, IndexerError> {
            self.inner.contract(address).await
        }
        async fn periods(&self, contract: &str) -> Result<Vec<Period>, IndexerError> {
            self.inner.periods(contract).await
        }
        async fn proposals(&self, contract: &str) -> Result<Vec<Proposal>, IndexerError> {
            self.inner.proposals(contract).await
        }
        async fn promotions(&self, contract: &str) -> Result<Vec<Promotion>, IndexerError> {
            self.inner.promotions(contract).await
        }
        async fn upvotes(&self, contract: &str) -> Result<Vec<Upvote>, IndexerError> {
            self.inner.upvotes(contract).await
        }
        async fn votes(&self, contract: &str) -> Result<Vec<Vote>, IndexerError> {
            self.inner.votes(contract).await
        }
        async fn reconnect(&self) -> Result<(), IndexerError> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn gateway(store: Arc<FlakyStore>) -> PersistenceGateway {
        PersistenceGateway::new(store, GatewayConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_after_reconnect() {
        let store = Arc::new(FlakyStore::new(2));
        let gw = gateway(store.clone());

        assert!(gw.upsert_period(&fixtures::period(0)).await);
        assert_eq!(store.reconnects.load(Ordering::SeqCst), 2);
        assert_eq!(gw.skipped(), 0);
        assert!(gw.period(CONTRACT, 0).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_is_skipped() {
        let store = Arc::new(FlakyStore::new(3));
        let gw = gateway(store.clone());

        assert!(!gw.upsert_period(&fixtures::period(0)).await);
        assert_eq!(gw.skipped(), 1);
        assert!(gw.period(CONTRACT, 0).await.unwrap().is_none());

        // The store has recovered; the next record goes through.
        assert!(gw.upsert_period(&fixtures::period(1)).await);
        assert_eq!(gw.skipped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_skip_does_not_abort_the_rest() {
        let store = Arc::new(FlakyStore::new(3));
        let gw = gateway(store.clone());

        let batch = GovernanceBatch {
            periods: vec![fixtures::period(0)],
            upvotes: vec![fixtures::upvote("ooA", "tz1a", "0xabc", 100)],
            proposals: vec![fixtures::proposal("0xabc", 100)],
            ..Default::default()
        };
        let outcome = gw.persist_batch(&fixtures::contract(true), &batch).await;

        // The contract row absorbs all three failures.
        assert_eq!(outcome, PersistOutcome { written: 3, skipped: 1, interrupted: false });
        assert!(gw.contract(CONTRACT).await.unwrap().is_none());
        assert_eq!(store.proposals(CONTRACT).await.unwrap()[0].upvotes, 100);
    }

    #[tokio::test]
    async fn batch_writes_upvotes_before_proposals() {
        let gw = PersistenceGateway::new(Arc::new(MemoryStore::new()), GatewayConfig::default());
        let batch = GovernanceBatch {
            periods: vec![fixtures::period(0)],
            upvotes: vec![
                fixtures::upvote("ooA", "tz1a", "0xabc", 100),
                fixtures::upvote("ooB", "tz1b", "0xabc", 40),
            ],
            proposals: vec![fixtures::proposal("0xabc", 0)],
            ..Default::default()
        };
        let outcome = gw.persist_batch(&fixtures::contract(true), &batch).await;

        assert_eq!(outcome, PersistOutcome { written: 5, skipped: 0, interrupted: false });
        assert_eq!(gw.store().proposals(CONTRACT).await.unwrap()[0].upvotes, 140);
        assert_eq!(gw.last_processed_period(CONTRACT).await.unwrap().unwrap().contract_voting_index, 0);
    }

    #[tokio::test]
    async fn shutdown_stops_between_records() {
        let (tx, rx) = watch::channel(false);
        let store = Arc::new(FlakyStore::stopping_after(3, tx));
        let gw = gateway(store.clone());
        let batch = GovernanceBatch {
            periods: vec![fixtures::period(0)],
            upvotes: vec![
                fixtures::upvote("ooA", "tz1a", "0xabc", 100),
                fixtures::upvote("ooB", "tz1b", "0xabc", 40),
            ],
            proposals: vec![fixtures::proposal("0xabc", 0)],
            ..Default::default()
        };
        let outcome = gw.persist_batch_until(&fixtures::contract(true), &batch, &rx).await;

        // Contract, period and the first upvote land; the signal arrives during the third write.
        assert_eq!(outcome, PersistOutcome { written: 3, skipped: 0, interrupted: true });
        assert_eq!(store.upvotes(CONTRACT).await.unwrap().len(), 1);
        assert!(store.proposals(CONTRACT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsignalled_batch_is_written_in_full() {
        let (_tx, rx) = watch::channel(false);
        let gw = gateway(Arc::new(FlakyStore::new(0)));
        let batch = GovernanceBatch {
            periods: vec![fixtures::period(0), fixtures::period(1)],
            ..Default::default()
        };
        let outcome = gw.persist_batch_until(&fixtures::contract(true), &batch, &rx).await;
        assert_eq!(outcome, PersistOutcome { written: 3, skipped: 0, interrupted: false });
    }

    #[test]
    fn record_keys() {
        let up = fixtures::upvote("ooA", "tz1a", "0xabc", 1);
        assert_eq!(Record::Upvote(&up).key(), "ooA/tz1a");
        assert_eq!(Record::Upvote(&up).kind(), "upvote");
        let p = fixtures::period(3);
        assert_eq!(Record::Period(&p).key(), format!("{CONTRACT}/3"));
    }
}
