//! Governance operations decoded at the upstream boundary.
//!
//! Raw transactions arrive with deeply optional JSON (`parameter.value` is a
//! string for kernel tracks and an object for the sequencer track). They are
//! decoded once into [`GovernanceOperation`] so classification never inspects
//! JSON fields itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::model::Ballot;

/// Entrypoints the indexer classifies.
pub const GOVERNANCE_ENTRYPOINTS: [&str; 3] = ["new_proposal", "upvote_proposal", "vote"];

// ─── Raw wire shape ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAccount {
    pub address: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawParameter {
    pub entrypoint: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A transaction as listed by the upstream API or pushed on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub hash: String,
    pub level: u64,
    pub timestamp: DateTime<Utc>,
    pub sender: RawAccount,
    #[serde(default)]
    pub target: Option<RawAccount>,
    #[serde(default)]
    pub parameter: Option<RawParameter>,
    #[serde(default)]
    pub status: Option<String>,
}

// ─── Decoded shape ────────────────────────────────────────────────────────────

/// The candidate a proposal, upvote or promotion refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProposalPayload {
    /// Kernel and security-kernel tracks: the kernel root hash as bytes.
    Kernel(String),
    /// Sequencer track: the proposed sequencer key and pool address.
    Sequencer { sequencer_pk: String, pool_address: String },
}

impl ProposalPayload {
    /// Canonical hash string used as `proposal_hash`.
    pub fn key(&self) -> String {
        match self {
            Self::Kernel(hash) => hash.clone(),
            Self::Sequencer { sequencer_pk, pool_address } => format!("{pool_address}:{sequencer_pk}"),
        }
    }
}

/// Fields every governance operation carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMeta {
    pub hash: String,
    pub level: u64,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub sender_alias: Option<String>,
    pub contract: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceOperation {
    NewProposal { meta: OperationMeta, payload: ProposalPayload },
    Upvote { meta: OperationMeta, payload: ProposalPayload },
    Vote { meta: OperationMeta, ballot: Ballot },
}

impl GovernanceOperation {
    pub fn meta(&self) -> &OperationMeta {
        match self {
            Self::NewProposal { meta, .. } | Self::Upvote { meta, .. } | Self::Vote { meta, .. } => meta,
        }
    }

    pub fn entrypoint(&self) -> &'static str {
        match self {
            Self::NewProposal { .. } => "new_proposal",
            Self::Upvote { .. } => "upvote_proposal",
            Self::Vote { .. } => "vote",
        }
    }
}

impl RawTransaction {
    /// Decode into a governance operation.
    ///
    /// Returns `Ok(None)` for failed/backtracked transactions, transactions
    /// without a target, and entrypoints the indexer does not classify.
    /// A known entrypoint with a malformed value is a decode error.
    pub fn decode(&self) -> Result<Option<GovernanceOperation>, IndexerError> {
        if matches!(self.status.as_deref(), Some(s) if s != "applied") {
            return Ok(None);
        }
        let (Some(target), Some(parameter)) = (&self.target, &self.parameter) else {
            return Ok(None);
        };

        let meta = OperationMeta {
            hash: self.hash.clone(),
            level: self.level,
            timestamp: self.timestamp,
            sender: self.sender.address.clone(),
            sender_alias: self.sender.alias.clone(),
            contract: target.address.clone(),
        };

        let op = match parameter.entrypoint.as_str() {
            "new_proposal" => GovernanceOperation::NewProposal {
                payload: decode_payload(&self.hash, &parameter.value)?,
                meta,
            },
            "upvote_proposal" => GovernanceOperation::Upvote {
                payload: decode_payload(&self.hash, &parameter.value)?,
                meta,
            },
            "vote" => {
                let ballot = parameter
                    .value
                    .as_str()
                    .ok_or_else(|| IndexerError::Decode(format!("vote {} has a non-string ballot", self.hash)))?
                    .parse::<Ballot>()
                    .map_err(|e| IndexerError::Decode(format!("vote {}: {e}", self.hash)))?;
                GovernanceOperation::Vote { meta, ballot }
            }
            _ => return Ok(None),
        };
        Ok(Some(op))
    }
}

fn decode_payload(hash: &str, value: &serde_json::Value) -> Result<ProposalPayload, IndexerError> {
    serde_json::from_value(value.clone())
        .map_err(|e| IndexerError::Decode(format!("proposal payload in {hash}: {e}")))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entrypoint: &str, value: serde_json::Value) -> RawTransaction {
        serde_json::from_value(serde_json::json!({
            "type": "transaction",
            "id": 1,
            "hash": "ooTx1",
            "level": 1050,
            "timestamp": "2024-05-01T10:00:00Z",
            "sender": { "address": "tz1baker", "alias": "Baker" },
            "target": { "address": "KT1gov" },
            "parameter": { "entrypoint": entrypoint, "value": value },
            "status": "applied"
        }))
        .unwrap()
    }

    #[test]
    fn decodes_kernel_proposal() {
        let op = raw("new_proposal", serde_json::json!("009279df4982e47cf101e2525b605fa06cd3ccc0f67d1c792a6a3ea56af9606abc"))
            .decode()
            .unwrap()
            .unwrap();
        let GovernanceOperation::NewProposal { meta, payload } = op else {
            panic!("expected new_proposal");
        };
        assert_eq!(meta.sender, "tz1baker");
        assert_eq!(meta.sender_alias.as_deref(), Some("Baker"));
        assert_eq!(meta.contract, "KT1gov");
        assert!(payload.key().starts_with("009279"));
    }

    #[test]
    fn decodes_sequencer_upvote() {
        let op = raw(
            "upvote_proposal",
            serde_json::json!({ "sequencer_pk": "edpkSeq", "pool_address": "0xpool" }),
        )
        .decode()
        .unwrap()
        .unwrap();
        let GovernanceOperation::Upvote { payload, .. } = op else {
            panic!("expected upvote");
        };
        assert_eq!(payload.key(), "0xpool:edpkSeq");
    }

    #[test]
    fn decodes_vote_ballot() {
        let op = raw("vote", serde_json::json!("nay")).decode().unwrap().unwrap();
        assert_eq!(op.entrypoint(), "vote");
        assert!(matches!(op, GovernanceOperation::Vote { ballot: Ballot::Nay, .. }));
    }

    #[test]
    fn skips_unknown_and_failed() {
        assert!(raw("trigger_kernel_upgrade", serde_json::json!("x")).decode().unwrap().is_none());
        let mut failed = raw("vote", serde_json::json!("yea"));
        failed.status = Some("backtracked".into());
        assert!(failed.decode().unwrap().is_none());
    }

    #[test]
    fn malformed_ballot_is_decode_error() {
        let err = raw("vote", serde_json::json!("maybe")).decode().unwrap_err();
        assert!(matches!(err, IndexerError::Decode(_)));
    }
}
