//! `TzktClient`: `ChainSource` over the TzKT REST API and a Tezos node RPC.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use govindex_core::cache::CacheConfig;
use govindex_core::contract::GovernanceStorage;
use govindex_core::error::IndexerError;
use govindex_core::operation::{RawTransaction, GOVERNANCE_ENTRYPOINTS};
use govindex_core::source::ChainSource;
use govindex_core::types::{BlockHead, ContractActivity, GlobalVotingPeriod, Voter};

use crate::fetcher::{build_url, Caching, ResilientFetcher};
use crate::retry::RetryConfig;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Mainnet chain id, used when none is configured.
pub const DEFAULT_CHAIN_ID: &str = "NetXdQprcVkpaWU";

/// Configuration for `TzktClient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TzktConfig {
    /// TzKT API base, e.g. `https://api.tzkt.io`.
    pub api_url: String,
    /// Tezos node RPC base used for on-chain view calls.
    pub rpc_url: String,
    pub chain_id: String,
    /// Contract exposing the `list_voters` delegation view.
    pub delegation_contract: String,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub request_timeout: Duration,
}

impl Default for TzktConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.tzkt.io".into(),
            rpc_url: "https://mainnet.tezos.ecadinfra.com".into(),
            chain_id: DEFAULT_CHAIN_ID.into(),
            delegation_contract: String::new(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// ─── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct HeadDto {
    level: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VotingPeriodDto {
    index: u64,
    first_level: u64,
    last_level: u64,
    #[serde(default)]
    total_voting_power: Option<u64>,
}

#[derive(Deserialize)]
struct AccountDto {
    address: String,
    #[serde(default)]
    alias: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoterDto {
    delegate: AccountDto,
    #[serde(default)]
    voting_power: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractDto {
    address: String,
    #[serde(default)]
    first_activity: Option<u64>,
    #[serde(default)]
    last_activity: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolConstantsDto {
    #[serde(default)]
    time_between_blocks: Option<u64>,
    #[serde(default)]
    minimal_block_delay: Option<u64>,
}

#[derive(Deserialize)]
struct ProtocolDto {
    constants: ProtocolConstantsDto,
}

#[derive(Deserialize)]
struct ViewResultDto {
    #[serde(default)]
    data: Value,
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Upstream reader backed by TzKT; every call goes through one `ResilientFetcher`.
pub struct TzktClient {
    config: TzktConfig,
    fetcher: ResilientFetcher,
}

impl TzktClient {
    /// Create a client with a `reqwest` transport.
    pub fn new(config: TzktConfig) -> Result<Self, IndexerError> {
        let transport = ReqwestTransport::new(config.request_timeout)
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: TzktConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let fetcher = ResilientFetcher::new(transport, config.retry.clone(), &config.cache);
        Self { config, fetcher }
    }

    pub fn config(&self) -> &TzktConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    fn api(&self, path: &str, query: &[(&str, String)]) -> String {
        build_url(&self.config.api_url, path, query)
    }

    async fn get_as<T: DeserializeOwned>(&self, url: &str, caching: Caching) -> Result<Option<T>, IndexerError> {
        match self.fetcher.get(url, caching).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| IndexerError::Decode(format!("{url}: {e}"))),
        }
    }
}

#[async_trait]
impl ChainSource for TzktClient {
    async fn head(&self) -> Result<BlockHead, IndexerError> {
        let url = self.api("v1/head", &[]);
        let head: HeadDto = self
            .get_as(&url, Caching::Bypass)
            .await?
            .ok_or_else(|| IndexerError::Fetch { url, reason: "empty head response".into() })?;
        Ok(BlockHead { level: head.level, timestamp: head.timestamp })
    }

    async fn block_time(&self, level: u64) -> Result<Option<DateTime<Utc>>, IndexerError> {
        let url = self.api(&format!("v1/blocks/{level}/timestamp"), &[]);
        self.get_as(&url, Caching::Cached).await
    }

    async fn time_between_blocks(&self) -> Result<u64, IndexerError> {
        let url = self.api("v1/protocols/current", &[]);
        let protocol: ProtocolDto = self
            .get_as(&url, Caching::Cached)
            .await?
            .ok_or_else(|| IndexerError::Fetch { url: url.clone(), reason: "no current protocol".into() })?;
        protocol
            .constants
            .time_between_blocks
            .or(protocol.constants.minimal_block_delay)
            .filter(|secs| *secs > 0)
            .ok_or_else(|| IndexerError::Decode(format!("{url}: missing block time constant")))
    }

    async fn global_voting_periods(&self) -> Result<Vec<GlobalVotingPeriod>, IndexerError> {
        let url = self.api("v1/voting/periods", &[("limit", "10000".into())]);
        let periods: Vec<VotingPeriodDto> = self.get_as(&url, Caching::Cached).await?.unwrap_or_default();
        Ok(periods
            .into_iter()
            .map(|p| GlobalVotingPeriod {
                index: p.index,
                first_level: p.first_level,
                last_level: p.last_level,
                total_voting_power: p.total_voting_power.unwrap_or(0),
            })
            .collect())
    }

    async fn voter(&self, global_index: u64, address: &str) -> Result<Option<Voter>, IndexerError> {
        let url = self.api(&format!("v1/voting/periods/{global_index}/voters/{address}"), &[]);
        let voter: Option<VoterDto> = self.get_as(&url, Caching::Cached).await?;
        Ok(voter.map(|v| Voter {
            address: v.delegate.address,
            alias: v.delegate.alias,
            voting_power: v.voting_power,
        }))
    }

    async fn contract_activity(&self, address: &str) -> Result<Option<ContractActivity>, IndexerError> {
        let url = self.api(&format!("v1/contracts/{address}"), &[]);
        let contract: Option<ContractDto> = self.get_as(&url, Caching::Bypass).await?;
        Ok(contract.and_then(|c| match (c.first_activity, c.last_activity) {
            (Some(first), Some(last)) => Some(ContractActivity {
                address: c.address,
                first_activity: first,
                last_activity: last,
            }),
            _ => None,
        }))
    }

    async fn contract_storage(&self, address: &str, level: u64) -> Result<Option<GovernanceStorage>, IndexerError> {
        let url = self.api(&format!("v1/contracts/{address}/storage"), &[("level", level.to_string())]);
        match self.fetcher.get(&url, Caching::Cached).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => GovernanceStorage::from_json(value).map(Some),
        }
    }

    async fn governance_transactions(
        &self,
        address: &str,
        from_level: u64,
        to_level: u64,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, IndexerError> {
        let url = self.api(
            "v1/operations/transactions",
            &[
                ("target", address.to_string()),
                ("entrypoint.in", GOVERNANCE_ENTRYPOINTS.join(",")),
                ("status", "applied".into()),
                ("level.ge", from_level.to_string()),
                ("level.le", to_level.to_string()),
                ("sort.asc", "level".into()),
                ("limit", limit.to_string()),
            ],
        );
        Ok(self.get_as(&url, Caching::Cached).await?.unwrap_or_default())
    }

    async fn delegators(&self, baker: &str, level: u64) -> Result<Vec<String>, IndexerError> {
        if self.config.delegation_contract.is_empty() {
            return Ok(Vec::new());
        }
        let url = build_url(
            &self.config.rpc_url,
            &format!("chains/main/blocks/{level}/helpers/scripts/run_script_view"),
            &[],
        );
        let body = json!({
            "contract": self.config.delegation_contract,
            "view": "list_voters",
            "input": { "prim": "Pair", "args": [{ "string": baker }, { "prim": "None" }] },
            "chain_id": self.config.chain_id,
            "unparsing_mode": "Readable",
        });
        let Some(reply) = self.fetcher.post(&url, &body, Caching::Cached).await? else {
            return Ok(Vec::new());
        };
        let result: ViewResultDto =
            serde_json::from_value(reply).map_err(|e| IndexerError::Decode(format!("{url}: {e}")))?;
        Ok(michelson_strings(&result.data))
    }
}

/// Collect `{"string": ..}` leaves of a Michelson list, in order.
fn michelson_strings(data: &Value) -> Vec<String> {
    match data {
        Value::Array(items) => items.iter().flat_map(michelson_strings).collect(),
        Value::Object(map) => match map.get("string").and_then(Value::as_str) {
            Some(s) => vec![s.to_string()],
            None => map.get("args").map(michelson_strings).unwrap_or_default(),
        },
        _ => Vec::new(),
    }
}
