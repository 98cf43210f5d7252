//! Typed view of a governance contract's on-chain storage.
//!
//! The upstream API renders Michelson naturals as JSON strings and `or`
//! variants as single-key objects (`{"promotion": {...}}`); both are handled
//! here so callers only see plain Rust types.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::IndexerError;
use crate::model::{ContractConfig, GovernanceTrack, Promotion};
use crate::operation::ProposalPayload;

/// Deserialize a natural encoded either as a JSON string or a JSON number.
pub fn de_nat<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Nat {
        Str(String),
        Num(u64),
    }
    match Nat::deserialize(d)? {
        Nat::Num(n) => Ok(n),
        Nat::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn de_nat_opt<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "de_nat")] u64);
    Ok(Option::<Wrap>::deserialize(d)?.map(|w| w.0).unwrap_or(0))
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(deserialize_with = "de_nat")]
    pub started_at_level: u64,
    #[serde(deserialize_with = "de_nat")]
    pub period_length: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub adoption_period_sec: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub upvoting_limit: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub proposal_quorum: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub promotion_quorum: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub promotion_supermajority: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalPeriodState {
    #[serde(default)]
    pub winner_candidate: Option<ProposalPayload>,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub max_upvotes_voting_power: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub total_voting_power: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionPeriodState {
    pub winner_candidate: ProposalPayload,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub yea_voting_power: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub nay_voting_power: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub pass_voting_power: u64,
    #[serde(default, deserialize_with = "de_nat_opt")]
    pub total_voting_power: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodState {
    Proposal(ProposalPeriodState),
    Promotion(PromotionPeriodState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingContext {
    #[serde(deserialize_with = "de_nat")]
    pub period_index: u64,
    pub period: PeriodState,
}

/// Storage snapshot of a governance contract at one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceStorage {
    pub config: StorageConfig,
    #[serde(default)]
    pub voting_context: Option<VotingContext>,
}

impl GovernanceStorage {
    /// Decode a raw storage JSON document.
    pub fn from_json(value: serde_json::Value) -> Result<Self, IndexerError> {
        serde_json::from_value(value).map_err(|e| IndexerError::Decode(format!("governance storage: {e}")))
    }

    /// The contract's own period index at this snapshot, if any voting happened yet.
    pub fn period_index(&self) -> Option<u64> {
        self.voting_context.as_ref().map(|c| c.period_index)
    }

    /// Promotion state and its period index, if the snapshot is in a promotion period.
    pub fn promotion(&self) -> Option<(u64, &PromotionPeriodState)> {
        match &self.voting_context {
            Some(VotingContext { period_index, period: PeriodState::Promotion(p) }) => Some((*period_index, p)),
            _ => None,
        }
    }

    /// Build the contract configuration from this (genesis) snapshot.
    pub fn contract_config(&self, address: &str, track: GovernanceTrack, active: bool) -> Result<ContractConfig, IndexerError> {
        let c = &self.config;
        if c.period_length == 0 {
            return Err(IndexerError::Consistency(format!(
                "contract {address} has period_length 0 in its genesis storage"
            )));
        }
        Ok(ContractConfig {
            address: address.to_string(),
            track,
            started_at_level: c.started_at_level,
            period_length: c.period_length,
            adoption_period_sec: c.adoption_period_sec,
            upvoting_limit: c.upvoting_limit,
            proposal_quorum: c.proposal_quorum,
            promotion_quorum: c.promotion_quorum,
            promotion_supermajority: c.promotion_supermajority,
            active,
        })
    }
}

impl PromotionPeriodState {
    /// Promotion record carrying this snapshot's tallies.
    pub fn to_promotion(&self, contract: &str, period_index: u64) -> Promotion {
        Promotion {
            contract_address: contract.to_string(),
            proposal_hash: self.winner_candidate.key(),
            contract_period_index: period_index,
            yea_voting_power: self.yea_voting_power,
            nay_voting_power: self.nay_voting_power,
            pass_voting_power: self.pass_voting_power,
            total_voting_power: self.total_voting_power,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_promotion_snapshot() {
        let storage = GovernanceStorage::from_json(serde_json::json!({
            "config": {
                "started_at_level": "1000",
                "period_length": "100",
                "adoption_period_sec": "3600",
                "upvoting_limit": "20",
                "proposal_quorum": "80",
                "promotion_quorum": "80",
                "promotion_supermajority": "75"
            },
            "voting_context": {
                "period_index": "1",
                "period": {
                    "promotion": {
                        "winner_candidate": "0xabc",
                        "yea_voting_power": "300",
                        "nay_voting_power": "10",
                        "pass_voting_power": "0",
                        "total_voting_power": "1000"
                    }
                }
            },
            "last_winner": null
        }))
        .unwrap();

        let (index, promotion) = storage.promotion().unwrap();
        assert_eq!(index, 1);
        assert_eq!(promotion.winner_candidate.key(), "0xabc");
        let record = promotion.to_promotion("KT1gov", index);
        assert_eq!(record.yea_voting_power, 300);
        assert_eq!(record.total_voting_power, 1000);
    }

    #[test]
    fn decodes_proposal_snapshot_with_numeric_fields() {
        let storage = GovernanceStorage::from_json(serde_json::json!({
            "config": { "started_at_level": 5, "period_length": 10 },
            "voting_context": {
                "period_index": 3,
                "period": { "proposal": { "winner_candidate": null, "max_upvotes_voting_power": null, "total_voting_power": "7" } }
            }
        }))
        .unwrap();
        assert_eq!(storage.period_index(), Some(3));
        assert!(storage.promotion().is_none());
    }

    #[test]
    fn genesis_storage_without_context() {
        let storage = GovernanceStorage::from_json(serde_json::json!({
            "config": { "started_at_level": "1000", "period_length": "100" }
        }))
        .unwrap();
        assert_eq!(storage.period_index(), None);
        let cfg = storage.contract_config("KT1gov", GovernanceTrack::Kernel, true).unwrap();
        assert_eq!(cfg.started_at_level, 1000);
        assert_eq!(cfg.period_length, 100);
    }

    #[test]
    fn zero_period_length_is_fatal() {
        let storage = GovernanceStorage::from_json(serde_json::json!({
            "config": { "started_at_level": "1000", "period_length": "0" }
        }))
        .unwrap();
        let err = storage.contract_config("KT1gov", GovernanceTrack::Kernel, true).unwrap_err();
        assert!(err.is_fatal());
    }
}
