//! govindex-core: foundation for the governance event indexer.
//!
//! # Architecture
//!
//! ```text
//! BatchIndexer / LiveListener
//!        ├── PeriodCalculator    (level/time skeleton per contract)
//!        ├── DelegationResolver  (baker → voters at a global epoch)
//!        ├── OperationProcessor  (new_proposal / upvote_proposal / vote)
//!        ├── ChainSource         (upstream reads: retry + cache)
//!        └── GovernanceStore     (idempotent upserts: memory / SQLite / Postgres)
//! ```

pub mod cache;
pub mod contract;
pub mod error;
pub mod model;
pub mod operation;
pub mod period;
pub mod source;
pub mod store;
pub mod types;

pub use cache::{BoundedCache, CacheConfig, CacheStats};
pub use contract::{GovernanceStorage, PeriodState, PromotionPeriodState, VotingContext};
pub use error::IndexerError;
pub use model::{
    Ballot, ContractConfig, GovernanceBatch, GovernanceTrack, Period, Promotion, Proposal, Upvote, Vote,
};
pub use operation::{GovernanceOperation, OperationMeta, ProposalPayload, RawTransaction};
pub use source::ChainSource;
pub use store::GovernanceStore;
pub use types::{BlockHead, ContractActivity, GlobalVotingPeriod, Voter};
