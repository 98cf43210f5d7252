//! Persisted governance records and their conflict-merge rules.
//!
//! Every backend applies the same `merge_from` rules on a natural-key
//! conflict, so memory, SQLite and Postgres converge to identical state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── GovernanceTrack ──────────────────────────────────────────────────────────

/// Which governance contract family a contract belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceTrack {
    Kernel,
    SecurityKernel,
    Sequencer,
}

impl GovernanceTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::SecurityKernel => "security_kernel",
            Self::Sequencer => "sequencer",
        }
    }
}

impl std::fmt::Display for GovernanceTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GovernanceTrack {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kernel" => Ok(Self::Kernel),
            "security_kernel" => Ok(Self::SecurityKernel),
            "sequencer" => Ok(Self::Sequencer),
            other => Err(format!("unknown governance track '{other}'")),
        }
    }
}

// ─── ContractConfig ───────────────────────────────────────────────────────────

/// Immutable configuration of a deployed governance contract, taken from its
/// genesis storage. Only `active` may change after deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    pub track: GovernanceTrack,
    pub started_at_level: u64,
    pub period_length: u64,
    pub adoption_period_sec: u64,
    pub upvoting_limit: u64,
    pub proposal_quorum: u64,
    pub promotion_quorum: u64,
    pub promotion_supermajority: u64,
    pub active: bool,
}

// ─── Period ───────────────────────────────────────────────────────────────────

/// One voting-period window of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub contract_address: String,
    pub contract_voting_index: u64,
    pub level_start: u64,
    /// Inclusive: `level_start + period_length - 1`.
    pub level_end: u64,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    /// Sampled once at `level_start`.
    pub total_voting_power: u64,
    /// Ordered, append-only.
    pub proposal_hashes: Vec<String>,
    /// Set at most once.
    pub promotion_hash: Option<String>,
}

impl Period {
    /// Append `hash` unless already present. Returns `true` if appended.
    pub fn add_proposal_hash(&mut self, hash: &str) -> bool {
        if self.proposal_hashes.iter().any(|h| h == hash) {
            return false;
        }
        self.proposal_hashes.push(hash.to_string());
        true
    }

    /// Set the promotion hash unless one is already recorded.
    /// Returns `true` if the hash was set.
    pub fn set_promotion_hash(&mut self, hash: &str) -> bool {
        if self.promotion_hash.is_some() {
            return false;
        }
        self.promotion_hash = Some(hash.to_string());
        true
    }

    /// Apply a conflicting write onto the stored row.
    ///
    /// Identity, level bounds, start date and sampled voting power stay as
    /// stored. `date_end` is refreshed (partial periods carry an estimate),
    /// proposal hashes are unioned in order and the promotion hash is set-once.
    pub fn merge_from(&mut self, incoming: &Period) {
        self.date_end = incoming.date_end;
        for hash in &incoming.proposal_hashes {
            self.add_proposal_hash(hash);
        }
        if let Some(hash) = &incoming.promotion_hash {
            self.set_promotion_hash(hash);
        }
    }
}

// ─── Proposal ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub contract_address: String,
    pub proposal_hash: String,
    pub contract_period_index: u64,
    pub level: u64,
    pub time: DateTime<Utc>,
    pub transaction_hash: String,
    pub proposer: String,
    pub alias: Option<String>,
    /// Running total voting power of all upvotes, proposer's included.
    pub upvotes: u64,
}

impl Proposal {
    /// Apply a conflicting write: alias is refreshed, upvotes never decrease.
    pub fn merge_from(&mut self, incoming: &Proposal) {
        if incoming.alias.is_some() {
            self.alias = incoming.alias.clone();
        }
        self.upvotes = self.upvotes.max(incoming.upvotes);
    }
}

// ─── Promotion ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub contract_address: String,
    /// Hash of the promoted candidate, shared with its `Proposal`.
    pub proposal_hash: String,
    /// The period after the proposal's period.
    pub contract_period_index: u64,
    pub yea_voting_power: u64,
    pub nay_voting_power: u64,
    pub pass_voting_power: u64,
    pub total_voting_power: u64,
}

impl Promotion {
    /// Promotion with zeroed tallies, created when a winner is confirmed.
    pub fn skeleton(
        contract_address: impl Into<String>,
        proposal_hash: impl Into<String>,
        contract_period_index: u64,
    ) -> Self {
        Self {
            contract_address: contract_address.into(),
            proposal_hash: proposal_hash.into(),
            contract_period_index,
            yea_voting_power: 0,
            nay_voting_power: 0,
            pass_voting_power: 0,
            total_voting_power: 0,
        }
    }

    /// Voting power cast so far (`yea + nay + pass`).
    pub fn voted_power(&self) -> u64 {
        self.yea_voting_power + self.nay_voting_power + self.pass_voting_power
    }

    /// Overwrite the tallies with `incoming` unless that would lower the
    /// voted power. Tallies are on-chain running totals, so a lower snapshot
    /// is a stale read. Returns `true` if the tallies were replaced.
    pub fn merge_from(&mut self, incoming: &Promotion) -> bool {
        if incoming.voted_power() < self.voted_power() {
            return false;
        }
        self.yea_voting_power = incoming.yea_voting_power;
        self.nay_voting_power = incoming.nay_voting_power;
        self.pass_voting_power = incoming.pass_voting_power;
        if incoming.total_voting_power > 0 || self.total_voting_power == 0 {
            self.total_voting_power = incoming.total_voting_power;
        }
        true
    }
}

// ─── Upvote / Vote ────────────────────────────────────────────────────────────

/// One baker's share of an upvote. Unique on `(transaction_hash, baker)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upvote {
    pub contract_address: String,
    pub contract_period_index: u64,
    pub proposal_hash: String,
    pub level: u64,
    pub time: DateTime<Utc>,
    pub transaction_hash: String,
    /// Address whose voting power this row carries.
    pub baker: String,
    pub alias: Option<String>,
    pub voting_power: u64,
    /// Address that sent the operation.
    pub sender: String,
}

/// A promotion-period ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ballot {
    Yea,
    Nay,
    Pass,
}

impl Ballot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yea => "yea",
            Self::Nay => "nay",
            Self::Pass => "pass",
        }
    }
}

impl std::str::FromStr for Ballot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yea" => Ok(Self::Yea),
            "nay" => Ok(Self::Nay),
            "pass" => Ok(Self::Pass),
            other => Err(format!("unknown ballot '{other}'")),
        }
    }
}

/// One baker's share of a promotion vote. Unique on `(transaction_hash, baker)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub contract_address: String,
    pub contract_period_index: u64,
    pub proposal_hash: String,
    pub level: u64,
    pub time: DateTime<Utc>,
    pub transaction_hash: String,
    pub baker: String,
    pub alias: Option<String>,
    pub voting_power: u64,
    pub vote: Ballot,
    pub sender: String,
}

// ─── GovernanceBatch ──────────────────────────────────────────────────────────

/// Records produced by classifying a run of operations, ready to persist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GovernanceBatch {
    pub periods: Vec<Period>,
    pub proposals: Vec<Proposal>,
    pub promotions: Vec<Promotion>,
    pub upvotes: Vec<Upvote>,
    pub votes: Vec<Vote>,
}

impl GovernanceBatch {
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
            && self.proposals.is_empty()
            && self.promotions.is_empty()
            && self.upvotes.is_empty()
            && self.votes.is_empty()
    }

    /// Total number of records in the batch.
    pub fn len(&self) -> usize {
        self.periods.len()
            + self.proposals.len()
            + self.promotions.len()
            + self.upvotes.len()
            + self.votes.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn period() -> Period {
        Period {
            contract_address: "KT1gov".into(),
            contract_voting_index: 0,
            level_start: 1000,
            level_end: 1099,
            date_start: DateTime::<Utc>::UNIX_EPOCH,
            date_end: DateTime::<Utc>::UNIX_EPOCH,
            total_voting_power: 500,
            proposal_hashes: vec![],
            promotion_hash: None,
        }
    }

    #[test]
    fn period_merge_unions_hashes_in_order() {
        let mut stored = period();
        stored.proposal_hashes = vec!["0xa".into(), "0xb".into()];
        let mut incoming = period();
        incoming.proposal_hashes = vec!["0xb".into(), "0xc".into()];
        stored.merge_from(&incoming);
        assert_eq!(stored.proposal_hashes, vec!["0xa", "0xb", "0xc"]);
    }

    #[test]
    fn promotion_hash_is_set_once() {
        let mut stored = period();
        stored.promotion_hash = Some("0xabc".into());
        let mut incoming = period();
        incoming.promotion_hash = Some("0xdef".into());
        stored.merge_from(&incoming);
        assert_eq!(stored.promotion_hash.as_deref(), Some("0xabc"));

        let mut empty = period();
        empty.merge_from(&incoming);
        assert_eq!(empty.promotion_hash.as_deref(), Some("0xdef"));

        // An absent incoming hash never clears a stored one.
        stored.merge_from(&period());
        assert_eq!(stored.promotion_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn promotion_tallies_overwrite_but_never_regress() {
        let mut stored = Promotion::skeleton("KT1gov", "0xabc", 1);
        let snapshot = Promotion {
            yea_voting_power: 300,
            nay_voting_power: 100,
            pass_voting_power: 0,
            total_voting_power: 1_000,
            ..Promotion::skeleton("KT1gov", "0xabc", 1)
        };
        assert!(stored.merge_from(&snapshot));
        assert_eq!(stored.voted_power(), 400);

        let stale = Promotion {
            yea_voting_power: 300,
            total_voting_power: 1_000,
            ..Promotion::skeleton("KT1gov", "0xabc", 1)
        };
        assert!(!stored.merge_from(&stale));
        assert_eq!(stored.nay_voting_power, 100);

        // A fresh zeroed skeleton must not wipe recorded tallies either.
        assert!(!stored.merge_from(&Promotion::skeleton("KT1gov", "0xabc", 1)));
        assert_eq!(stored.voted_power(), 400);
    }

    #[test]
    fn proposal_upvotes_never_decrease() {
        let mut stored = Proposal {
            contract_address: "KT1gov".into(),
            proposal_hash: "0xabc".into(),
            contract_period_index: 0,
            level: 1050,
            time: DateTime::<Utc>::UNIX_EPOCH,
            transaction_hash: "oo1".into(),
            proposer: "tz1p".into(),
            alias: None,
            upvotes: 900,
        };
        let mut incoming = stored.clone();
        incoming.upvotes = 100;
        incoming.alias = Some("Baker".into());
        stored.merge_from(&incoming);
        assert_eq!(stored.upvotes, 900);
        assert_eq!(stored.alias.as_deref(), Some("Baker"));
    }

    #[test]
    fn track_and_ballot_parse() {
        assert_eq!("security_kernel".parse::<GovernanceTrack>().unwrap(), GovernanceTrack::SecurityKernel);
        assert!("council".parse::<GovernanceTrack>().is_err());
        assert_eq!("nay".parse::<Ballot>().unwrap(), Ballot::Nay);
        assert_eq!(serde_json::to_string(&Ballot::Pass).unwrap(), "\"pass\"");
    }
}
