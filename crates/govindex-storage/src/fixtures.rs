//! Sample records shared by the backend tests.

use chrono::{DateTime, TimeZone, Utc};

use govindex_core::model::{
    Ballot, ContractConfig, GovernanceTrack, Period, Promotion, Proposal, Upvote, Vote,
};

pub const CONTRACT: &str = "KT1govKernel";

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600 + secs, 0).single().unwrap()
}

pub fn contract(active: bool) -> ContractConfig {
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
        active,
    }
}

pub fn period(index: u64) -> Period {
    let start = 1000 + index * 100;
    Period {
        contract_address: CONTRACT.into(),
        contract_voting_index: index,
        level_start: start,
        level_end: start + 99,
        date_start: at(start as i64 * 8),
        date_end: at((start + 99) as i64 * 8),
        total_voting_power: 10_000,
        proposal_hashes: vec![],
        promotion_hash: None,
    }
}

pub fn proposal(hash: &str, upvotes: u64) -> Proposal {
    Proposal {
        contract_address: CONTRACT.into(),
        proposal_hash: hash.into(),
        contract_period_index: 0,
        level: 1050,
        time: at(400),
        transaction_hash: "ooProposal".into(),
        proposer: "tz1proposer".into(),
        alias: None,
        upvotes,
    }
}

pub fn upvote(tx: &str, baker: &str, hash: &str, power: u64) -> Upvote {
    Upvote {
        contract_address: CONTRACT.into(),
        contract_period_index: 0,
        proposal_hash: hash.into(),
        level: 1060,
        time: at(480),
        transaction_hash: tx.into(),
        baker: baker.into(),
        alias: None,
        voting_power: power,
        sender: "tz1sender".into(),
    }
}

pub fn promotion(hash: &str, yea: u64, nay: u64, pass: u64) -> Promotion {
    Promotion {
        yea_voting_power: yea,
        nay_voting_power: nay,
        pass_voting_power: pass,
        total_voting_power: 10_000,
        ..Promotion::skeleton(CONTRACT, hash, 1)
    }
}

pub fn vote(tx: &str, baker: &str, ballot: Ballot, power: u64) -> Vote {
    Vote {
        contract_address: CONTRACT.into(),
        contract_period_index: 1,
        proposal_hash: "0xabc".into(),
        level: 1150,
        time: at(1200),
        transaction_hash: tx.into(),
        baker: baker.into(),
        alias: Some("Baker".into()),
        voting_power: power,
        vote: ballot,
        sender: baker.into(),
    }
}

// ─── Backend conformance checks ───────────────────────────────────────────────
//
// Every backend runs these against a fresh store.

pub mod conformance {
    use super::*;
    use govindex_core::store::GovernanceStore;

    pub async fn contract_only_updates_active(store: &dyn GovernanceStore) {
        store.upsert_contract(&contract(true)).await.unwrap();
        let mut changed = contract(false);
        changed.period_length = 999;
        store.upsert_contract(&changed).await.unwrap();

        let stored = store.contract(CONTRACT).await.unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.period_length, 100);
        assert!(store.contract("KT1unknown").await.unwrap().is_none());
    }

    pub async fn period_upsert_is_idempotent(store: &dyn GovernanceStore) {
        let mut p = period(0);
        p.proposal_hashes = vec!["0xabc".into()];
        store.upsert_period(&p).await.unwrap();
        store.upsert_period(&p).await.unwrap();

        let periods = store.periods(CONTRACT).await.unwrap();
        assert_eq!(periods, vec![p]);
    }

    pub async fn period_hashes_union_and_promotion_set_once(store: &dyn GovernanceStore) {
        let mut first = period(1);
        first.proposal_hashes = vec!["0xa".into()];
        first.promotion_hash = Some("0xabc".into());
        store.upsert_period(&first).await.unwrap();

        let mut second = period(1);
        second.proposal_hashes = vec!["0xa".into(), "0xb".into()];
        second.promotion_hash = Some("0xdef".into());
        store.upsert_period(&second).await.unwrap();

        // Absent promotion hash never clears the stored one.
        store.upsert_period(&period(1)).await.unwrap();

        let stored = store.period(CONTRACT, 1).await.unwrap().unwrap();
        assert_eq!(stored.proposal_hashes, vec!["0xa", "0xb"]);
        assert_eq!(stored.promotion_hash.as_deref(), Some("0xabc"));
    }

    pub async fn concurrent_first_writes_keep_every_hash(store: &dyn GovernanceStore) {
        let with_hash = |hash: &str| {
            let mut p = period(4);
            p.proposal_hashes = vec![hash.to_string()];
            p
        };
        let (a, b, c, d) = (with_hash("0xa"), with_hash("0xb"), with_hash("0xc"), with_hash("0xd"));
        let (ra, rb, rc, rd) = tokio::join!(
            store.upsert_period(&a),
            store.upsert_period(&b),
            store.upsert_period(&c),
            store.upsert_period(&d),
        );
        for result in [ra, rb, rc, rd] {
            result.unwrap();
        }

        let mut hashes = store.period(CONTRACT, 4).await.unwrap().unwrap().proposal_hashes;
        hashes.sort();
        assert_eq!(hashes, vec!["0xa", "0xb", "0xc", "0xd"]);
    }

    pub async fn last_processed_period_is_highest_index(store: &dyn GovernanceStore) {
        assert!(store.last_processed_period(CONTRACT).await.unwrap().is_none());
        for i in [2, 0, 1] {
            store.upsert_period(&period(i)).await.unwrap();
        }
        let last = store.last_processed_period(CONTRACT).await.unwrap().unwrap();
        assert_eq!(last.contract_voting_index, 2);
        let indices: Vec<u64> = store
            .periods(CONTRACT)
            .await
            .unwrap()
            .iter()
            .map(|p| p.contract_voting_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    pub async fn upvotes_converge_to_row_sum(store: &dyn GovernanceStore) {
        store.upsert_upvote(&upvote("ooA", "tz1a", "0xabc", 100)).await.unwrap();
        store.upsert_upvote(&upvote("ooA", "tz1b", "0xabc", 50)).await.unwrap();
        store.upsert_proposal(&proposal("0xabc", 150)).await.unwrap();

        // A later batch upvote for a proposal from an earlier batch.
        store.upsert_upvote(&upvote("ooB", "tz1c", "0xabc", 25)).await.unwrap();
        // Replays change nothing.
        store.upsert_upvote(&upvote("ooB", "tz1c", "0xabc", 25)).await.unwrap();
        store.upsert_proposal(&proposal("0xabc", 150)).await.unwrap();

        let proposals = store.proposals(CONTRACT).await.unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].upvotes, 175);
        assert_eq!(store.upvotes(CONTRACT).await.unwrap().len(), 3);
    }

    pub async fn proposal_alias_refreshes(store: &dyn GovernanceStore) {
        store.upsert_proposal(&proposal("0xabc", 10)).await.unwrap();
        let mut named = proposal("0xabc", 10);
        named.alias = Some("Proposer".into());
        named.level = 9999;
        store.upsert_proposal(&named).await.unwrap();

        let stored = &store.proposals(CONTRACT).await.unwrap()[0];
        assert_eq!(stored.alias.as_deref(), Some("Proposer"));
        assert_eq!(stored.level, 1050);
    }

    pub async fn promotion_tallies_never_regress(store: &dyn GovernanceStore) {
        store.upsert_promotion(&Promotion::skeleton(CONTRACT, "0xabc", 1)).await.unwrap();
        store.upsert_promotion(&promotion("0xabc", 300, 100, 0)).await.unwrap();
        // Stale snapshot and a replayed skeleton are both ignored.
        store.upsert_promotion(&promotion("0xabc", 300, 0, 0)).await.unwrap();
        store.upsert_promotion(&Promotion::skeleton(CONTRACT, "0xabc", 1)).await.unwrap();

        let stored = &store.promotions(CONTRACT).await.unwrap()[0];
        assert_eq!(stored.yea_voting_power, 300);
        assert_eq!(stored.nay_voting_power, 100);
        assert_eq!(stored.total_voting_power, 10_000);

        store.upsert_promotion(&promotion("0xabc", 300, 100, 50)).await.unwrap();
        let stored = &store.promotions(CONTRACT).await.unwrap()[0];
        assert_eq!(stored.pass_voting_power, 50);
    }

    pub async fn votes_are_append_only(store: &dyn GovernanceStore) {
        store.upsert_vote(&vote("ooV", "tz1a", Ballot::Yea, 300)).await.unwrap();
        store.upsert_vote(&vote("ooV", "tz1a", Ballot::Nay, 999)).await.unwrap();
        store.upsert_vote(&vote("ooV", "tz1b", Ballot::Yea, 20)).await.unwrap();

        let votes = store.votes(CONTRACT).await.unwrap();
        assert_eq!(votes.len(), 2);
        let first = votes.iter().find(|v| v.baker == "tz1a").unwrap();
        assert_eq!(first.vote, Ballot::Yea);
        assert_eq!(first.voting_power, 300);
    }
}
