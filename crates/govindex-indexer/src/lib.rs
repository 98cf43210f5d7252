//! govindex-indexer: the governance indexing pipeline.
//!
//! ```text
//! ChainSource ──► PeriodCalculator ──► period skeleton ─┐
//!      │                                                ├─► OperationProcessor ──► GovernanceBatch
//!      └──────► DelegationResolver ──► voters ──────────┘                               │
//!                                                                                      ▼
//!                                                   BatchIndexer ──► PersistenceGateway
//! ```
//!
//! - [`PeriodCalculator`]: level/time skeleton with sampled voting power
//! - [`DelegationResolver`]: baker plus delegators, priced per voting epoch
//! - [`OperationProcessor`]: per-entrypoint classification into records
//! - [`BatchIndexer`]: staged backfill, concurrent across contracts
//!
//! The live listener in `govindex-live` reuses the same context and processor.

pub mod batch;
pub mod context;
pub mod delegation;
pub mod periods;
pub mod processor;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use batch::{BatchIndexer, BatchStage, IndexReport};
pub use context::{ContractTarget, IndexerContext, IndexerSettings};
pub use delegation::DelegationResolver;
pub use periods::{estimate_time, ChainSnapshot, PeriodCalculator};
pub use processor::OperationProcessor;
