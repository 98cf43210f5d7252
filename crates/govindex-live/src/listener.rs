//! LiveListener: keeps stored governance state current from pushed events.
//!
//! # States
//! `Disconnected → Connecting → Subscribed → (event loop) → Disconnected`,
//! re-entering `Connecting` with exponential backoff until shutdown.
//!
//! Contract configurations are loaded once at start. Head events at a period
//! boundary persist the new period's skeleton and resolve the promotion of
//! the period that just ended. Operation events are classified with the
//! batch processor and written straight through the gateway.
//!
//! Every event is handled on its own task, so events are not processed in
//! arrival order. Writes for one contract are serialized by a per-contract
//! lock; different contracts proceed concurrently. On shutdown the listener
//! stops reading and waits for every event task still in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use govindex_core::error::IndexerError;
use govindex_core::model::ContractConfig;
use govindex_core::operation::{GovernanceOperation, RawTransaction};
use govindex_core::types::BlockHead;
use govindex_indexer::{ContractTarget, IndexerContext};

use crate::signalr::{self, HubEvent};

/// Live channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// TzKT events endpoint, e.g. `wss://api.tzkt.io/v1/ws`.
    pub ws_url: String,
    /// Reconnect backoff starting duration (milliseconds).
    pub reconnect_initial_ms: u64,
    /// Maximum reconnect backoff (milliseconds).
    pub reconnect_max_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.tzkt.io/v1/ws".into(),
            reconnect_initial_ms: 500,
            reconnect_max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
}

struct Tracked {
    config: ContractConfig,
    writer: tokio::sync::Mutex<()>,
}

/// Event handling, shared by every spawned event task.
pub struct LiveHandler {
    ctx: IndexerContext,
    contracts: HashMap<String, Tracked>,
    last_head: AtomicU64,
}

impl LiveHandler {
    /// Load each target's configuration (store first, then chain).
    pub async fn load(ctx: IndexerContext, targets: &[ContractTarget]) -> Result<Self, IndexerError> {
        let mut contracts = HashMap::new();
        for target in targets {
            let config = ctx.stored_or_chain_contract(target).await?;
            info!(
                contract = %config.address,
                started_at = config.started_at_level,
                period_length = config.period_length,
                "tracking contract"
            );
            contracts.insert(
                config.address.clone(),
                Tracked {
                    config,
                    writer: tokio::sync::Mutex::new(()),
                },
            );
        }
        Ok(Self {
            ctx,
            contracts,
            last_head: AtomicU64::new(0),
        })
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    /// Highest head level seen.
    pub fn last_head(&self) -> u64 {
        self.last_head.load(Ordering::Relaxed)
    }

    /// Period rollover for every contract whose period starts at `head.level`.
    pub async fn handle_head(&self, head: BlockHead) {
        self.last_head.fetch_max(head.level, Ordering::Relaxed);
        for tracked in self.contracts.values() {
            if !tracked.config.is_period_boundary(head.level) {
                continue;
            }
            let _guard = tracked.writer.lock().await;
            if let Err(e) = self.rollover(&tracked.config, head.level).await {
                error!(contract = %tracked.config.address, level = head.level, error = %e, "period rollover failed");
            }
        }
    }

    async fn rollover(&self, config: &ContractConfig, level: u64) -> Result<(), IndexerError> {
        let Some(index) = config.period_index(level) else {
            return Ok(());
        };
        let skeleton = self.ctx.periods.skeleton(config, index).await?;
        self.ctx.gateway.upsert_period(&skeleton).await;
        info!(contract = %config.address, index, level, "period rollover");

        // The period that just ended may have been the promotion of the one before it.
        if index < 2 {
            return Ok(());
        }
        let (proposal_index, ended_index) = (index - 2, index - 1);
        let proposed = self
            .ctx
            .gateway
            .period(&config.address, proposal_index)
            .await?
            .is_some_and(|p| !p.proposal_hashes.is_empty());
        if !proposed {
            return Ok(());
        }
        let mut ended = match self.ctx.gateway.period(&config.address, ended_index).await? {
            Some(p) if p.promotion_hash.is_some() => return Ok(()),
            Some(p) => p,
            None => self.ctx.periods.skeleton(config, ended_index).await?,
        };
        let processor = self.ctx.processor();
        if let Some(promotion) = processor.resolve_promotion(config, proposal_index, level).await? {
            ended.set_promotion_hash(&promotion.proposal_hash);
            self.ctx.gateway.upsert_promotion(&promotion).await;
            self.ctx.gateway.upsert_period(&ended).await;
            info!(contract = %config.address, period = ended_index, hash = %promotion.proposal_hash, "promotion recorded");
        }
        Ok(())
    }

    /// Decoded governance operations for tracked contracts.
    pub fn governance_operations(&self, transactions: &[RawTransaction]) -> Vec<GovernanceOperation> {
        transactions
            .iter()
            .filter_map(|tx| match tx.decode() {
                Ok(op) => op,
                Err(e) => {
                    warn!(hash = %tx.hash, error = %e, "undecodable pushed operation skipped");
                    None
                }
            })
            .filter(|op| self.contracts.contains_key(&op.meta().contract))
            .collect()
    }

    /// Classify and persist one operation.
    pub async fn handle_operation(&self, op: GovernanceOperation) {
        let meta = op.meta();
        let Some(tracked) = self.contracts.get(&meta.contract) else {
            return;
        };
        let _guard = tracked.writer.lock().await;
        if let Err(e) = self.apply(&tracked.config, &op).await {
            error!(
                contract = %meta.contract,
                entrypoint = op.entrypoint(),
                hash = %meta.hash,
                error = %e,
                "live operation failed"
            );
        }
    }

    async fn apply(&self, config: &ContractConfig, op: &GovernanceOperation) -> Result<(), IndexerError> {
        let level = op.meta().level;
        let mut seed = Vec::new();
        if let Some(index) = config.period_index(level) {
            if let Some(period) = self.ctx.gateway.period(&config.address, index).await? {
                seed.push(period);
            }
        }
        let head_level = self.last_head().max(level);
        let batch = self
            .ctx
            .processor()
            .process(config, seed, std::slice::from_ref(op), head_level)
            .await?;
        let outcome = self.ctx.gateway.persist_batch(config, &batch).await;
        debug!(
            contract = %config.address,
            entrypoint = op.entrypoint(),
            level,
            written = outcome.written,
            skipped = outcome.skipped,
            "live operation persisted"
        );
        Ok(())
    }
}

enum SessionEnd {
    Shutdown,
    Lost,
}

pub struct LiveListener {
    handler: Arc<LiveHandler>,
    config: LiveConfig,
    state: Mutex<ListenerState>,
}

impl LiveListener {
    pub async fn new(ctx: IndexerContext, targets: &[ContractTarget], config: LiveConfig) -> Result<Self, IndexerError> {
        Ok(Self {
            handler: Arc::new(LiveHandler::load(ctx, targets).await?),
            config,
            state: Mutex::new(ListenerState::Disconnected),
        })
    }

    pub fn handler(&self) -> &Arc<LiveHandler> {
        &self.handler
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: ListenerState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
        debug!(state = ?next, "live listener state");
    }

    /// Run until `shutdown` turns `true`, reconnecting on connection loss.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        let initial = Duration::from_millis(self.config.reconnect_initial_ms);
        let max = Duration::from_millis(self.config.reconnect_max_ms);
        let mut backoff = initial;
        let mut tasks = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.set_state(ListenerState::Connecting);
            info!(url = %self.config.ws_url, "connecting to live channel");

            match tokio_tungstenite::connect_async(self.config.ws_url.as_str()).await {
                Err(e) => warn!(error = %e, "live channel connect failed, retrying in {backoff:?}"),
                Ok((stream, _)) => {
                    backoff = initial;
                    match self.session(stream, &mut shutdown, &mut tasks).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost => warn!(
                            last_head = self.handler.last_head(),
                            "live channel lost, reconnecting in {backoff:?}"
                        ),
                    }
                }
            }
            self.set_state(ListenerState::Disconnected);

            tokio::select! {
                _ = time::sleep(backoff) => {}
                _ = shutdown.changed() => {}
            }
            backoff = (backoff * 2).min(max);
        }

        self.set_state(ListenerState::Disconnected);
        drain(&mut tasks).await;
        info!(last_head = self.handler.last_head(), "live listener stopped");
        Ok(())
    }

    async fn session<S>(
        &self,
        stream: S,
        shutdown: &mut watch::Receiver<bool>,
        tasks: &mut JoinSet<()>,
    ) -> SessionEnd
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut sink, mut stream) = stream.split();

        let mut outgoing = vec![signalr::handshake(), signalr::subscribe_head(0)];
        outgoing.extend(
            self.handler
                .addresses()
                .enumerate()
                .map(|(i, address)| signalr::subscribe_operations(i as u64 + 1, address)),
        );
        for text in outgoing {
            if let Err(e) = sink.send(Message::Text(text)).await {
                warn!(error = %e, "live channel subscribe failed");
                return SessionEnd::Lost;
            }
        }
        self.set_state(ListenerState::Subscribed);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                msg = stream.next() => match msg {
                    None => return SessionEnd::Lost,
                    Some(Err(e)) => {
                        warn!(error = %e, "live channel receive error");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(Message::Text(text))) => {
                        for message in signalr::split_frames(&text) {
                            match signalr::parse_message(message) {
                                Ok(HubEvent::Ping) => {
                                    let _ = sink.send(Message::Text(signalr::ping())).await;
                                }
                                Ok(HubEvent::Close { error }) => {
                                    warn!(error = ?error, "live channel closed by server");
                                    return SessionEnd::Lost;
                                }
                                Ok(HubEvent::Handshake { error: Some(error) }) => {
                                    error!(error = %error, "live channel handshake rejected");
                                    return SessionEnd::Lost;
                                }
                                Ok(event) => self.dispatch(event, tasks),
                                Err(e) => warn!(error = %e, "live channel message skipped"),
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    fn dispatch(&self, event: HubEvent, tasks: &mut JoinSet<()>) {
        while let Some(joined) = tasks.try_join_next() {
            report_panic(joined);
        }
        match event {
            HubEvent::Head(head) => {
                let handler = self.handler.clone();
                tasks.spawn(async move { handler.handle_head(head).await });
            }
            HubEvent::Operations { transactions, .. } => {
                for op in self.handler.governance_operations(&transactions) {
                    let handler = self.handler.clone();
                    tasks.spawn(async move { handler.handle_operation(op).await });
                }
            }
            HubEvent::State { channel, state } => debug!(channel = %channel, state, "channel synchronized"),
            HubEvent::Reorg { channel, state } => warn!(channel = %channel, state, "channel reorg"),
            HubEvent::Completion { error: Some(error), invocation_id } => {
                warn!(invocation_id = ?invocation_id, error = %error, "subscription rejected")
            }
            _ => {}
        }
    }
}

/// Wait for every in-flight event task.
async fn drain(tasks: &mut JoinSet<()>) {
    if !tasks.is_empty() {
        info!(pending = tasks.len(), "waiting for in-flight live events");
    }
    while let Some(joined) = tasks.join_next().await {
        report_panic(joined);
    }
}

fn report_panic(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "live event task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govindex_core::model::Period;
    use govindex_core::store::GovernanceStore;
    use govindex_indexer::mock::{self, MockChain, CONTRACT};
    use govindex_indexer::IndexerSettings;
    use govindex_storage::MemoryStore;

    async fn handler(chain: MockChain, store: Arc<MemoryStore>) -> LiveHandler {
        let ctx = IndexerContext::new(Arc::new(chain), store, IndexerSettings::default());
        LiveHandler::load(ctx, &[mock::target()]).await.unwrap()
    }

    fn stored_period(index: u64) -> Period {
        let config = mock::config();
        Period {
            contract_address: CONTRACT.into(),
            contract_voting_index: index,
            level_start: config.period_start(index),
            level_end: config.period_end(index),
            date_start: mock::time_at(config.period_start(index)),
            date_end: mock::time_at(config.period_end(index)),
            total_voting_power: mock::TOTAL_POWER,
            proposal_hashes: vec![],
            promotion_hash: None,
        }
    }

    fn head(level: u64) -> BlockHead {
        BlockHead {
            level,
            timestamp: mock::time_at(level),
        }
    }

    #[tokio::test]
    async fn loads_contract_once_and_persists_it() {
        let store = Arc::new(MemoryStore::new());
        let h = handler(mock::scenario(1450), store.clone()).await;
        assert_eq!(h.addresses().collect::<Vec<_>>(), vec![CONTRACT]);
        assert_eq!(store.contract(CONTRACT).await.unwrap(), Some(mock::config()));
    }

    #[tokio::test]
    async fn boundary_head_creates_period_skeleton() {
        let store = Arc::new(MemoryStore::new());
        let h = handler(mock::scenario(1300), store.clone()).await;

        h.handle_head(head(1299)).await;
        assert!(store.periods(CONTRACT).await.unwrap().is_empty());

        h.handle_head(head(1300)).await;
        let periods = store.periods(CONTRACT).await.unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].contract_voting_index, 3);
        assert!(periods[0].proposal_hashes.is_empty());
        assert_eq!(h.last_head(), 1300);
    }

    #[tokio::test]
    async fn rollover_resolves_ended_promotion() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_period(&Period {
                proposal_hashes: vec!["0xaa".into()],
                ..stored_period(0)
            })
            .await
            .unwrap();
        let h = handler(mock::scenario(1200), store.clone()).await;

        h.handle_head(head(1200)).await;

        let ended = store.period(CONTRACT, 1).await.unwrap().unwrap();
        assert_eq!(ended.promotion_hash.as_deref(), Some("0xaa"));
        let promotions = store.promotions(CONTRACT).await.unwrap();
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].contract_period_index, 1);
        assert!(store.period(CONTRACT, 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pushed_operations_converge_like_backfill() {
        let chain = mock::scenario(1450);
        let transactions = chain.transactions.clone();
        let store = Arc::new(MemoryStore::new());
        let h = handler(chain, store.clone()).await;
        h.handle_head(head(1450)).await;

        let ops = h.governance_operations(&transactions);
        assert_eq!(ops.len(), 3);
        for op in ops.iter().cloned() {
            h.handle_operation(op).await;
        }
        // Replays after a reconnect change nothing.
        for op in ops {
            h.handle_operation(op).await;
        }

        let proposals = store.proposals(CONTRACT).await.unwrap();
        assert_eq!(proposals[0].upvotes, 600);
        assert_eq!(store.upvotes(CONTRACT).await.unwrap().len(), 3);
        assert_eq!(store.votes(CONTRACT).await.unwrap().len(), 1);
        assert_eq!(store.promotions(CONTRACT).await.unwrap()[0].yea_voting_power, 500);
        let period0 = store.period(CONTRACT, 0).await.unwrap().unwrap();
        assert_eq!(period0.proposal_hashes, vec!["0xaa"]);
        assert_eq!(
            store.period(CONTRACT, 1).await.unwrap().unwrap().promotion_hash.as_deref(),
            Some("0xaa")
        );
    }

    #[tokio::test]
    async fn untracked_contracts_are_filtered() {
        let mut chain = mock::scenario(1450);
        for tx in &mut chain.transactions {
            if let Some(target) = tx.target.as_mut() {
                target.address = "KT1other".into();
            }
        }
        let transactions = chain.transactions.clone();
        let h = handler(chain, Arc::new(MemoryStore::new())).await;
        assert!(h.governance_operations(&transactions).is_empty());
    }

    #[tokio::test]
    async fn in_flight_events_finish_before_drain_returns() {
        let chain = mock::scenario(1450);
        let transactions = chain.transactions.clone();
        let store = Arc::new(MemoryStore::new());
        let ctx = IndexerContext::new(Arc::new(chain), store.clone(), IndexerSettings::default());
        let listener = LiveListener::new(ctx, &[mock::target()], LiveConfig::default()).await.unwrap();

        let mut tasks = JoinSet::new();
        listener.dispatch(HubEvent::Head(head(1450)), &mut tasks);
        listener.dispatch(HubEvent::Operations { state: 1150, transactions }, &mut tasks);
        assert_eq!(tasks.len(), 4);

        drain(&mut tasks).await;
        assert!(tasks.is_empty());
        assert_eq!(store.upvotes(CONTRACT).await.unwrap().len(), 3);
        assert_eq!(store.votes(CONTRACT).await.unwrap().len(), 1);
        assert_eq!(store.proposals(CONTRACT).await.unwrap()[0].upvotes, 600);
    }

    #[tokio::test]
    async fn shutdown_stops_reconnect_loop() {
        let ctx = IndexerContext::new(
            Arc::new(mock::scenario(1450)),
            Arc::new(MemoryStore::new()),
            IndexerSettings::default(),
        );
        let config = LiveConfig {
            ws_url: "ws://127.0.0.1:1/v1/ws".into(),
            reconnect_initial_ms: 10,
            reconnect_max_ms: 20,
        };
        let listener = Arc::new(LiveListener::new(ctx, &[mock::target()], config).await.unwrap());
        assert_eq!(listener.state(), ListenerState::Disconnected);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn({
            let listener = listener.clone();
            async move { listener.run(rx).await }
        });
        time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = time::timeout(Duration::from_secs(10), task).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(listener.state(), ListenerState::Disconnected);
    }
}
