//! In-memory `ChainSource` with a scripted governance history.
//!
//! Scenario (contract started at 1000, periods of 100 levels, 8s blocks):
//! - 1050: `tz1a` (delegated to by `tz1d`) proposes `0xaa`
//! - 1060: `tz1b` upvotes `0xaa`
//! - 1150: `tz1c` votes yea; the contract is in promotion period 1

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use govindex_core::contract::GovernanceStorage;
use govindex_core::error::IndexerError;
use govindex_core::model::{ContractConfig, GovernanceTrack};
use govindex_core::operation::{RawAccount, RawParameter, RawTransaction};
use govindex_core::source::ChainSource;
use govindex_core::types::{BlockHead, ContractActivity, GlobalVotingPeriod, Voter};

use crate::context::ContractTarget;

pub const CONTRACT: &str = "KT1gov";
pub const BLOCK_TIME: u64 = 8;
pub const TOTAL_POWER: u64 = 10_000;
pub const EPOCH: u64 = 7;

pub fn time_at(level: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600 + (level * BLOCK_TIME) as i64, 0).single().unwrap()
}

pub fn config() -> ContractConfig {
    ContractConfig {
        address: CONTRACT.into(),
        track: GovernanceTrack::Kernel,
        started_at_level: 1000,
        period_length: 100,
        adoption_period_sec: 3600,
        upvoting_limit: 20,
        proposal_quorum: 80,
        promotion_quorum: 80,
        promotion_supermajority: 75,
        active: true,
    }
}

pub fn target() -> ContractTarget {
    ContractTarget {
        address: CONTRACT.into(),
        track: GovernanceTrack::Kernel,
        active: true,
    }
}

fn storage_config() -> serde_json::Value {
    json!({
        "started_at_level": "1000",
        "period_length": "100",
        "adoption_period_sec": "3600",
        "upvoting_limit": "20",
        "proposal_quorum": "80",
        "promotion_quorum": "80",
        "promotion_supermajority": "75"
    })
}

pub fn genesis_storage() -> GovernanceStorage {
    GovernanceStorage::from_json(json!({ "config": storage_config() })).unwrap()
}

pub fn proposal_storage(index: u64, winner: Option<&str>) -> GovernanceStorage {
    GovernanceStorage::from_json(json!({
        "config": storage_config(),
        "voting_context": {
            "period_index": index.to_string(),
            "period": { "proposal": {
                "winner_candidate": winner,
                "max_upvotes_voting_power": "600",
                "total_voting_power": TOTAL_POWER.to_string()
            } }
        }
    }))
    .unwrap()
}

pub fn promotion_storage(index: u64, winner: &str, yea: u64, nay: u64, pass: u64) -> GovernanceStorage {
    GovernanceStorage::from_json(json!({
        "config": storage_config(),
        "voting_context": {
            "period_index": index.to_string(),
            "period": { "promotion": {
                "winner_candidate": winner,
                "yea_voting_power": yea.to_string(),
                "nay_voting_power": nay.to_string(),
                "pass_voting_power": pass.to_string(),
                "total_voting_power": "1100"
            } }
        }
    }))
    .unwrap()
}

pub fn tx(hash: &str, level: u64, sender: &str, entrypoint: &str, value: serde_json::Value) -> RawTransaction {
    RawTransaction {
        hash: hash.into(),
        level,
        timestamp: time_at(level),
        sender: RawAccount {
            address: sender.into(),
            alias: None,
        },
        target: Some(RawAccount {
            address: CONTRACT.into(),
            alias: Some("Kernel Governance".into()),
        }),
        parameter: Some(RawParameter {
            entrypoint: entrypoint.into(),
            value,
        }),
        status: Some("applied".into()),
    }
}

pub struct MockChain {
    head: Mutex<u64>,
    pub voting_periods: Vec<GlobalVotingPeriod>,
    pub voters: HashMap<(u64, String), Voter>,
    pub failing_voters: HashSet<String>,
    pub delegators: HashMap<String, Vec<String>>,
    pub storages: BTreeMap<u64, GovernanceStorage>,
    pub transactions: Vec<RawTransaction>,
    pub activity: ContractActivity,
    /// Remaining failures per address before `voter` recovers.
    outages: Mutex<HashMap<String, usize>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

/// The scripted history with the chain head at `head`.
pub fn scenario(head: u64) -> MockChain {
    let voter = |address: &str, alias: Option<&str>, power: u64| {
        (
            (EPOCH, address.to_string()),
            Voter {
                address: address.into(),
                alias: alias.map(str::to_string),
                voting_power: power,
            },
        )
    };

    let mut storages = BTreeMap::new();
    storages.insert(1000, genesis_storage());
    storages.insert(1050, proposal_storage(0, None));
    storages.insert(1060, proposal_storage(0, Some("0xaa")));
    storages.insert(1150, promotion_storage(1, "0xaa", 500, 0, 0));

    MockChain {
        head: Mutex::new(head),
        voting_periods: vec![GlobalVotingPeriod {
            index: EPOCH,
            first_level: 0,
            last_level: 100_000,
            total_voting_power: TOTAL_POWER,
        }],
        voters: HashMap::from([
            voter("tz1a", Some("Alpha"), 300),
            voter("tz1b", None, 100),
            voter("tz1c", Some("Charlie"), 500),
            voter("tz1d", None, 200),
        ]),
        failing_voters: HashSet::new(),
        delegators: HashMap::from([("tz1a".to_string(), vec!["tz1d".to_string()])]),
        storages,
        transactions: vec![
            tx("ooNew", 1050, "tz1a", "new_proposal", json!("0xaa")),
            tx("ooUp", 1060, "tz1b", "upvote_proposal", json!("0xaa")),
            tx("ooVote", 1150, "tz1c", "vote", json!("yea")),
        ],
        activity: ContractActivity {
            address: CONTRACT.into(),
            first_activity: 1000,
            last_activity: 1150,
        },
        outages: Mutex::new(HashMap::new()),
        calls: Mutex::new(HashMap::new()),
    }
}

impl MockChain {
    pub fn set_head(&self, level: u64) {
        *self.head.lock().unwrap() = level;
    }

    pub fn head_block(&self) -> BlockHead {
        let level = *self.head.lock().unwrap();
        BlockHead {
            level,
            timestamp: time_at(level),
        }
    }

    /// Make the next `times` voting-power lookups of `address` fail.
    pub fn fail_voter(&self, address: &str, times: usize) {
        self.outages.lock().unwrap().insert(address.to_string(), times);
    }

    fn take_outage(&self, address: &str) -> bool {
        let mut outages = self.outages.lock().unwrap();
        match outages.get_mut(address) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn head_calls(&self) -> usize {
        self.calls("head")
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn head(&self) -> Result<BlockHead, IndexerError> {
        self.record("head");
        Ok(self.head_block())
    }

    async fn block_time(&self, level: u64) -> Result<Option<DateTime<Utc>>, IndexerError> {
        self.record("block_time");
        Ok((level <= self.head_block().level).then(|| time_at(level)))
    }

    async fn time_between_blocks(&self) -> Result<u64, IndexerError> {
        Ok(BLOCK_TIME)
    }

    async fn global_voting_periods(&self) -> Result<Vec<GlobalVotingPeriod>, IndexerError> {
        self.record("global_voting_periods");
        Ok(self.voting_periods.clone())
    }

    async fn voter(&self, global_index: u64, address: &str) -> Result<Option<Voter>, IndexerError> {
        self.record("voter");
        if self.failing_voters.contains(address) || self.take_outage(address) {
            return Err(IndexerError::Fetch {
                url: format!("mock://voters/{address}"),
                reason: "503 Service Unavailable".into(),
            });
        }
        Ok(self.voters.get(&(global_index, address.to_string())).cloned())
    }

    async fn contract_activity(&self, address: &str) -> Result<Option<ContractActivity>, IndexerError> {
        Ok((address == CONTRACT).then(|| self.activity.clone()))
    }

    async fn contract_storage(&self, address: &str, level: u64) -> Result<Option<GovernanceStorage>, IndexerError> {
        self.record("contract_storage");
        if address != CONTRACT {
            return Ok(None);
        }
        Ok(self.storages.range(..=level).next_back().map(|(_, s)| s.clone()))
    }

    async fn governance_transactions(
        &self,
        address: &str,
        from_level: u64,
        to_level: u64,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, IndexerError> {
        self.record("governance_transactions");
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.target.as_ref().is_some_and(|a| a.address == address))
            .filter(|t| from_level <= t.level && t.level <= to_level)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delegators(&self, baker: &str, _level: u64) -> Result<Vec<String>, IndexerError> {
        self.record("delegators");
        Ok(self.delegators.get(baker).cloned().unwrap_or_default())
    }
}
