//! Upstream-facing chain types shared by the indexing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── BlockHead ────────────────────────────────────────────────────────────────

/// The chain head (or any block) reduced to what period bookkeeping needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHead {
    pub level: u64,
    pub timestamp: DateTime<Utc>,
}

// ─── GlobalVotingPeriod ───────────────────────────────────────────────────────

/// A protocol-level voting epoch. Distinct from a governance contract's own
/// period index; used to look up registered voting power snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVotingPeriod {
    pub index: u64,
    pub first_level: u64,
    pub last_level: u64,
    pub total_voting_power: u64,
}

impl GlobalVotingPeriod {
    /// Returns `true` if `level` falls inside this epoch (bounds inclusive).
    pub fn contains(&self, level: u64) -> bool {
        self.first_level <= level && level <= self.last_level
    }
}

/// Find the epoch that contains `level`.
pub fn find_voting_period(periods: &[GlobalVotingPeriod], level: u64) -> Option<&GlobalVotingPeriod> {
    periods.iter().find(|p| p.contains(level))
}

// ─── Voter ────────────────────────────────────────────────────────────────────

/// One address resolved to its registered voting power at one global epoch.
/// Ephemeral: produced by delegation resolution, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub address: String,
    pub alias: Option<String>,
    pub voting_power: u64,
}

/// Sum of voting power across a resolved voter set.
pub fn total_power(voters: &[Voter]) -> u64 {
    voters.iter().map(|v| v.voting_power).sum()
}

// ─── ContractActivity ─────────────────────────────────────────────────────────

/// First and last levels at which a contract saw any activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractActivity {
    pub address: String,
    pub first_activity: u64,
    pub last_activity: u64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(index: u64, first: u64, last: u64) -> GlobalVotingPeriod {
        GlobalVotingPeriod {
            index,
            first_level: first,
            last_level: last,
            total_voting_power: 1_000,
        }
    }

    #[test]
    fn voting_period_lookup_is_inclusive() {
        let periods = vec![epoch(10, 1, 100), epoch(11, 101, 200)];
        assert_eq!(find_voting_period(&periods, 100).unwrap().index, 10);
        assert_eq!(find_voting_period(&periods, 101).unwrap().index, 11);
        assert!(find_voting_period(&periods, 201).is_none());
    }

    #[test]
    fn total_power_sums_all_voters() {
        let voters = vec![
            Voter { address: "tz1a".into(), alias: None, voting_power: 5 },
            Voter { address: "tz1b".into(), alias: Some("b".into()), voting_power: 7 },
        ];
        assert_eq!(total_power(&voters), 12);
    }
}
