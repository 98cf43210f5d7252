//! PostgreSQL storage backend for GovIndex.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! govindex-storage = { version = "0.2", features = ["postgres"] }
//! ```
//!
//! # Schema
//! Created automatically on first connect:
//! - `contracts`, `periods`, `proposals`, `promotions`, `upvotes`, `votes`
//! - `schema_migrations`: applied schema versions

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use govindex_core::error::IndexerError;
use govindex_core::model::{
    Ballot, ContractConfig, GovernanceTrack, Period, Promotion, Proposal, Upvote, Vote,
};
use govindex_core::store::GovernanceStore;

use crate::SCHEMA_VERSION;

// ─── Connection options ────────────────────────────────────────────────────────

/// Connection options for the Postgres storage backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_migrations (
        version    BIGINT      PRIMARY KEY,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS contracts (
        address                 TEXT    PRIMARY KEY,
        track                   TEXT    NOT NULL,
        started_at_level        BIGINT  NOT NULL,
        period_length           BIGINT  NOT NULL,
        adoption_period_sec     BIGINT  NOT NULL,
        upvoting_limit          BIGINT  NOT NULL,
        proposal_quorum         BIGINT  NOT NULL,
        promotion_quorum        BIGINT  NOT NULL,
        promotion_supermajority BIGINT  NOT NULL,
        active                  BOOLEAN NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS periods (
        contract_address      TEXT        NOT NULL,
        contract_voting_index BIGINT      NOT NULL,
        level_start           BIGINT      NOT NULL,
        level_end             BIGINT      NOT NULL,
        date_start            TIMESTAMPTZ NOT NULL,
        date_end              TIMESTAMPTZ NOT NULL,
        total_voting_power    BIGINT      NOT NULL,
        proposal_hashes       JSONB       NOT NULL DEFAULT '[]'::jsonb,
        promotion_hash        TEXT,
        PRIMARY KEY (contract_address, contract_voting_index)
    )",
    "CREATE TABLE IF NOT EXISTS proposals (
        contract_address      TEXT        NOT NULL,
        proposal_hash         TEXT        NOT NULL,
        contract_period_index BIGINT      NOT NULL,
        level                 BIGINT      NOT NULL,
        time                  TIMESTAMPTZ NOT NULL,
        transaction_hash      TEXT        NOT NULL,
        proposer              TEXT        NOT NULL,
        alias                 TEXT,
        upvotes               BIGINT      NOT NULL,
        PRIMARY KEY (contract_address, proposal_hash)
    )",
    "CREATE TABLE IF NOT EXISTS promotions (
        contract_address      TEXT   NOT NULL,
        proposal_hash         TEXT   NOT NULL,
        contract_period_index BIGINT NOT NULL,
        yea_voting_power      BIGINT NOT NULL,
        nay_voting_power      BIGINT NOT NULL,
        pass_voting_power     BIGINT NOT NULL,
        total_voting_power    BIGINT NOT NULL,
        PRIMARY KEY (contract_address, proposal_hash)
    )",
    "CREATE TABLE IF NOT EXISTS upvotes (
        contract_address      TEXT        NOT NULL,
        contract_period_index BIGINT      NOT NULL,
        proposal_hash         TEXT        NOT NULL,
        level                 BIGINT      NOT NULL,
        time                  TIMESTAMPTZ NOT NULL,
        transaction_hash      TEXT        NOT NULL,
        baker                 TEXT        NOT NULL,
        alias                 TEXT,
        voting_power          BIGINT      NOT NULL,
        sender                TEXT        NOT NULL,
        PRIMARY KEY (transaction_hash, baker)
    )",
    "CREATE TABLE IF NOT EXISTS votes (
        contract_address      TEXT        NOT NULL,
        contract_period_index BIGINT      NOT NULL,
        proposal_hash         TEXT        NOT NULL,
        level                 BIGINT      NOT NULL,
        time                  TIMESTAMPTZ NOT NULL,
        transaction_hash      TEXT        NOT NULL,
        baker                 TEXT        NOT NULL,
        alias                 TEXT,
        voting_power          BIGINT      NOT NULL,
        vote                  TEXT        NOT NULL,
        sender                TEXT        NOT NULL,
        PRIMARY KEY (transaction_hash, baker)
    )",
    "CREATE INDEX IF NOT EXISTS idx_upvotes_proposal ON upvotes (contract_address, proposal_hash)",
    "CREATE INDEX IF NOT EXISTS idx_votes_contract ON votes (contract_address, level)",
];

const REFRESH_UPVOTES: &str = "UPDATE proposals p
     SET upvotes = GREATEST(p.upvotes, (
         SELECT COALESCE(SUM(u.voting_power), 0)::BIGINT FROM upvotes u
         WHERE u.contract_address = p.contract_address
           AND u.proposal_hash = p.proposal_hash))
     WHERE p.contract_address = $1 AND p.proposal_hash = $2";

fn storage(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

// ─── PostgresStore ────────────────────────────────────────────────────────────

/// PostgreSQL-backed governance store.
///
/// The pool sits behind a lock so [`GovernanceStore::reconnect`] can swap in
/// a fresh one after repeated write failures.
pub struct PostgresStore {
    url: String,
    options: PostgresOptions,
    pool: RwLock<PgPool>,
}

impl PostgresStore {
    /// Connect to a PostgreSQL database and initialize the schema.
    ///
    /// The URL format follows libpq convention:
    /// `postgresql://[user[:password]@][host][:port][/dbname]`
    pub async fn connect(database_url: &str) -> Result<Self, IndexerError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    /// Connect with custom pool options.
    pub async fn connect_with_options(database_url: &str, options: PostgresOptions) -> Result<Self, IndexerError> {
        let pool = Self::open_pool(database_url, &options).await?;
        let store = Self {
            url: database_url.to_string(),
            options,
            pool: RwLock::new(pool),
        };
        store.init_schema().await?;
        info!("PostgresStore connected and schema initialized");
        Ok(store)
    }

    async fn open_pool(url: &str, options: &PostgresOptions) -> Result<PgPool, IndexerError> {
        PgPoolOptions::new()
            .max_connections(options.max_connections)
            .min_connections(options.min_connections)
            .acquire_timeout(Duration::from_secs(options.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| IndexerError::Storage(format!("postgres connect: {e}")))
    }

    async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        let pool = self.pool().await;
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await.map_err(storage)?;
        }
        sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1) ON CONFLICT (version) DO NOTHING")
            .bind(SCHEMA_VERSION)
            .execute(&pool)
            .await
            .map_err(storage)?;
        debug!(version = SCHEMA_VERSION, "postgres schema initialized");
        Ok(())
    }

    /// Highest applied schema version.
    pub async fn schema_version(&self) -> Result<Option<i64>, IndexerError> {
        let row = sqlx::query("SELECT MAX(version) AS v FROM schema_migrations")
            .fetch_one(&self.pool().await)
            .await
            .map_err(storage)?;
        row.try_get("v").map_err(storage)
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn nat(row: &PgRow, col: &str) -> Result<u64, IndexerError> {
    Ok(row.try_get::<i64, _>(col).map_err(storage)? as u64)
}

fn text(row: &PgRow, col: &str) -> Result<String, IndexerError> {
    row.try_get(col).map_err(storage)
}

fn opt_text(row: &PgRow, col: &str) -> Result<Option<String>, IndexerError> {
    row.try_get(col).map_err(storage)
}

fn time(row: &PgRow, col: &str) -> Result<DateTime<Utc>, IndexerError> {
    row.try_get(col).map_err(storage)
}

fn contract_from_row(row: &PgRow) -> Result<ContractConfig, IndexerError> {
    Ok(ContractConfig {
        address: text(row, "address")?,
        track: text(row, "track")?.parse::<GovernanceTrack>().map_err(IndexerError::Storage)?,
        started_at_level: nat(row, "started_at_level")?,
        period_length: nat(row, "period_length")?,
        adoption_period_sec: nat(row, "adoption_period_sec")?,
        upvoting_limit: nat(row, "upvoting_limit")?,
        proposal_quorum: nat(row, "proposal_quorum")?,
        promotion_quorum: nat(row, "promotion_quorum")?,
        promotion_supermajority: nat(row, "promotion_supermajority")?,
        active: row.try_get("active").map_err(storage)?,
    })
}

fn period_from_row(row: &PgRow) -> Result<Period, IndexerError> {
    let Json(proposal_hashes) = row.try_get::<Json<Vec<String>>, _>("proposal_hashes").map_err(storage)?;
    Ok(Period {
        contract_address: text(row, "contract_address")?,
        contract_voting_index: nat(row, "contract_voting_index")?,
        level_start: nat(row, "level_start")?,
        level_end: nat(row, "level_end")?,
        date_start: time(row, "date_start")?,
        date_end: time(row, "date_end")?,
        total_voting_power: nat(row, "total_voting_power")?,
        proposal_hashes,
        promotion_hash: opt_text(row, "promotion_hash")?,
    })
}

fn proposal_from_row(row: &PgRow) -> Result<Proposal, IndexerError> {
    Ok(Proposal {
        contract_address: text(row, "contract_address")?,
        proposal_hash: text(row, "proposal_hash")?,
        contract_period_index: nat(row, "contract_period_index")?,
        level: nat(row, "level")?,
        time: time(row, "time")?,
        transaction_hash: text(row, "transaction_hash")?,
        proposer: text(row, "proposer")?,
        alias: opt_text(row, "alias")?,
        upvotes: nat(row, "upvotes")?,
    })
}

fn promotion_from_row(row: &PgRow) -> Result<Promotion, IndexerError> {
    Ok(Promotion {
        contract_address: text(row, "contract_address")?,
        proposal_hash: text(row, "proposal_hash")?,
        contract_period_index: nat(row, "contract_period_index")?,
        yea_voting_power: nat(row, "yea_voting_power")?,
        nay_voting_power: nat(row, "nay_voting_power")?,
        pass_voting_power: nat(row, "pass_voting_power")?,
        total_voting_power: nat(row, "total_voting_power")?,
    })
}

fn upvote_from_row(row: &PgRow) -> Result<Upvote, IndexerError> {
    Ok(Upvote {
        contract_address: text(row, "contract_address")?,
        contract_period_index: nat(row, "contract_period_index")?,
        proposal_hash: text(row, "proposal_hash")?,
        level: nat(row, "level")?,
        time: time(row, "time")?,
        transaction_hash: text(row, "transaction_hash")?,
        baker: text(row, "baker")?,
        alias: opt_text(row, "alias")?,
        voting_power: nat(row, "voting_power")?,
        sender: text(row, "sender")?,
    })
}

fn vote_from_row(row: &PgRow) -> Result<Vote, IndexerError> {
    Ok(Vote {
        contract_address: text(row, "contract_address")?,
        contract_period_index: nat(row, "contract_period_index")?,
        proposal_hash: text(row, "proposal_hash")?,
        level: nat(row, "level")?,
        time: time(row, "time")?,
        transaction_hash: text(row, "transaction_hash")?,
        baker: text(row, "baker")?,
        alias: opt_text(row, "alias")?,
        voting_power: nat(row, "voting_power")?,
        vote: text(row, "vote")?.parse::<Ballot>().map_err(IndexerError::Storage)?,
        sender: text(row, "sender")?,
    })
}

// ─── GovernanceStore impl ─────────────────────────────────────────────────────

#[async_trait]
impl GovernanceStore for PostgresStore {
    async fn upsert_contract(&self, c: &ContractConfig) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO contracts
             (address, track, started_at_level, period_length, adoption_period_sec, upvoting_limit,
              proposal_quorum, promotion_quorum, promotion_supermajority, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (address) DO UPDATE SET active = EXCLUDED.active",
        )
        .bind(&c.address)
        .bind(c.track.as_str())
        .bind(c.started_at_level as i64)
        .bind(c.period_length as i64)
        .bind(c.adoption_period_sec as i64)
        .bind(c.upvoting_limit as i64)
        .bind(c.proposal_quorum as i64)
        .bind(c.promotion_quorum as i64)
        .bind(c.promotion_supermajority as i64)
        .bind(c.active)
        .execute(&self.pool().await)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn upsert_period(&self, period: &Period) -> Result<(), IndexerError> {
        let pool = self.pool().await;
        let mut tx = pool.begin().await.map_err(storage)?;
        let inserted = sqlx::query(
            "INSERT INTO periods
             (contract_address, contract_voting_index, level_start, level_end, date_start, date_end,
              total_voting_power, proposal_hashes, promotion_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (contract_address, contract_voting_index) DO NOTHING",
        )
        .bind(&period.contract_address)
        .bind(period.contract_voting_index as i64)
        .bind(period.level_start as i64)
        .bind(period.level_end as i64)
        .bind(period.date_start)
        .bind(period.date_end)
        .bind(period.total_voting_power as i64)
        .bind(Json(&period.proposal_hashes))
        .bind(&period.promotion_hash)
        .execute(&mut *tx)
        .await
        .map_err(storage)?
        .rows_affected();

        if inserted == 0 {
            // The row exists now, so the lock holds until commit.
            let row = sqlx::query(
                "SELECT * FROM periods WHERE contract_address = $1 AND contract_voting_index = $2 FOR UPDATE",
            )
            .bind(&period.contract_address)
            .bind(period.contract_voting_index as i64)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
            let mut stored = period_from_row(&row)?;
            stored.merge_from(period);

            sqlx::query(
                "UPDATE periods SET date_end = $3, proposal_hashes = $4, promotion_hash = $5
                 WHERE contract_address = $1 AND contract_voting_index = $2",
            )
            .bind(&stored.contract_address)
            .bind(stored.contract_voting_index as i64)
            .bind(stored.date_end)
            .bind(Json(&stored.proposal_hashes))
            .bind(&stored.promotion_hash)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn upsert_proposal(&self, proposal: &Proposal) -> Result<(), IndexerError> {
        let pool = self.pool().await;
        let mut tx = pool.begin().await.map_err(storage)?;
        let existing =
            sqlx::query("SELECT * FROM proposals WHERE contract_address = $1 AND proposal_hash = $2 FOR UPDATE")
                .bind(&proposal.contract_address)
                .bind(&proposal.proposal_hash)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;

        let merged = match existing {
            Some(row) => {
                let mut stored = proposal_from_row(&row)?;
                stored.merge_from(proposal);
                stored
            }
            None => proposal.clone(),
        };

        sqlx::query(
            "INSERT INTO proposals
             (contract_address, proposal_hash, contract_period_index, level, time, transaction_hash,
              proposer, alias, upvotes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (contract_address, proposal_hash) DO UPDATE SET
                alias = COALESCE(EXCLUDED.alias, proposals.alias),
                upvotes = GREATEST(proposals.upvotes, EXCLUDED.upvotes)",
        )
        .bind(&merged.contract_address)
        .bind(&merged.proposal_hash)
        .bind(merged.contract_period_index as i64)
        .bind(merged.level as i64)
        .bind(merged.time)
        .bind(&merged.transaction_hash)
        .bind(&merged.proposer)
        .bind(&merged.alias)
        .bind(merged.upvotes as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query(REFRESH_UPVOTES)
            .bind(&proposal.contract_address)
            .bind(&proposal.proposal_hash)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn upsert_promotion(&self, promotion: &Promotion) -> Result<(), IndexerError> {
        let pool = self.pool().await;
        let mut tx = pool.begin().await.map_err(storage)?;
        let inserted = sqlx::query(
            "INSERT INTO promotions
             (contract_address, proposal_hash, contract_period_index, yea_voting_power,
              nay_voting_power, pass_voting_power, total_voting_power)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (contract_address, proposal_hash) DO NOTHING",
        )
        .bind(&promotion.contract_address)
        .bind(&promotion.proposal_hash)
        .bind(promotion.contract_period_index as i64)
        .bind(promotion.yea_voting_power as i64)
        .bind(promotion.nay_voting_power as i64)
        .bind(promotion.pass_voting_power as i64)
        .bind(promotion.total_voting_power as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage)?
        .rows_affected();

        if inserted == 0 {
            let row =
                sqlx::query("SELECT * FROM promotions WHERE contract_address = $1 AND proposal_hash = $2 FOR UPDATE")
                    .bind(&promotion.contract_address)
                    .bind(&promotion.proposal_hash)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(storage)?;
            let mut stored = promotion_from_row(&row)?;
            if !stored.merge_from(promotion) {
                debug!(
                    contract = %promotion.contract_address,
                    hash = %promotion.proposal_hash,
                    "stale promotion snapshot ignored"
                );
                return Ok(());
            }

            sqlx::query(
                "UPDATE promotions SET yea_voting_power = $3, nay_voting_power = $4,
                    pass_voting_power = $5, total_voting_power = $6
                 WHERE contract_address = $1 AND proposal_hash = $2",
            )
            .bind(&stored.contract_address)
            .bind(&stored.proposal_hash)
            .bind(stored.yea_voting_power as i64)
            .bind(stored.nay_voting_power as i64)
            .bind(stored.pass_voting_power as i64)
            .bind(stored.total_voting_power as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn upsert_upvote(&self, u: &Upvote) -> Result<(), IndexerError> {
        let pool = self.pool().await;
        let mut tx = pool.begin().await.map_err(storage)?;
        sqlx::query(
            "INSERT INTO upvotes
             (contract_address, contract_period_index, proposal_hash, level, time, transaction_hash,
              baker, alias, voting_power, sender)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (transaction_hash, baker) DO NOTHING",
        )
        .bind(&u.contract_address)
        .bind(u.contract_period_index as i64)
        .bind(&u.proposal_hash)
        .bind(u.level as i64)
        .bind(u.time)
        .bind(&u.transaction_hash)
        .bind(&u.baker)
        .bind(&u.alias)
        .bind(u.voting_power as i64)
        .bind(&u.sender)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query(REFRESH_UPVOTES)
            .bind(&u.contract_address)
            .bind(&u.proposal_hash)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn upsert_vote(&self, v: &Vote) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO votes
             (contract_address, contract_period_index, proposal_hash, level, time, transaction_hash,
              baker, alias, voting_power, vote, sender)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (transaction_hash, baker) DO NOTHING",
        )
        .bind(&v.contract_address)
        .bind(v.contract_period_index as i64)
        .bind(&v.proposal_hash)
        .bind(v.level as i64)
        .bind(v.time)
        .bind(&v.transaction_hash)
        .bind(&v.baker)
        .bind(&v.alias)
        .bind(v.voting_power as i64)
        .bind(v.vote.as_str())
        .bind(&v.sender)
        .execute(&self.pool().await)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn last_processed_period(&self, contract: &str) -> Result<Option<Period>, IndexerError> {
        let row = sqlx::query(
            "SELECT * FROM periods WHERE contract_address = $1
             ORDER BY contract_voting_index DESC LIMIT 1",
        )
        .bind(contract)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(storage)?;
        row.as_ref().map(period_from_row).transpose()
    }

    async fn period(&self, contract: &str, index: u64) -> Result<Option<Period>, IndexerError> {
        let row = sqlx::query("SELECT * FROM periods WHERE contract_address = $1 AND contract_voting_index = $2")
            .bind(contract)
            .bind(index as i64)
            .fetch_optional(&self.pool().await)
            .await
            .map_err(storage)?;
        row.as_ref().map(period_from_row).transpose()
    }

    async fn contract(&self, address: &str) -> Result<Option<ContractConfig>, IndexerError> {
        let row = sqlx::query("SELECT * FROM contracts WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool().await)
            .await
            .map_err(storage)?;
        row.as_ref().map(contract_from_row).transpose()
    }

    async fn periods(&self, contract: &str) -> Result<Vec<Period>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM periods WHERE contract_address = $1 ORDER BY contract_voting_index")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?;
        rows.iter().map(period_from_row).collect()
    }

    async fn proposals(&self, contract: &str) -> Result<Vec<Proposal>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM proposals WHERE contract_address = $1 ORDER BY level, proposal_hash")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?;
        rows.iter().map(proposal_from_row).collect()
    }

    async fn promotions(&self, contract: &str) -> Result<Vec<Promotion>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM promotions WHERE contract_address = $1 ORDER BY contract_period_index")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?;
        rows.iter().map(promotion_from_row).collect()
    }

    async fn upvotes(&self, contract: &str) -> Result<Vec<Upvote>, IndexerError> {
        let rows = sqlx::query(
            "SELECT * FROM upvotes WHERE contract_address = $1 ORDER BY level, transaction_hash, baker",
        )
        .bind(contract)
        .fetch_all(&self.pool().await)
        .await
        .map_err(storage)?;
        rows.iter().map(upvote_from_row).collect()
    }

    async fn votes(&self, contract: &str) -> Result<Vec<Vote>, IndexerError> {
        let rows = sqlx::query(
            "SELECT * FROM votes WHERE contract_address = $1 ORDER BY level, transaction_hash, baker",
        )
        .bind(contract)
        .fetch_all(&self.pool().await)
        .await
        .map_err(storage)?;
        rows.iter().map(vote_from_row).collect()
    }

    async fn reconnect(&self) -> Result<(), IndexerError> {
        let fresh = Self::open_pool(&self.url, &self.options).await?;
        let old = std::mem::replace(&mut *self.pool.write().await, fresh);
        old.close().await;
        warn!("postgres pool reconnected");
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::conformance;

    // Integration tests require a running Postgres instance.
    // Set DATABASE_URL environment variable to enable.
    // Example: DATABASE_URL=postgresql://localhost/govindex_test cargo test -- --ignored
    //
    // Each test wipes the governance tables first.

    async fn fresh_store() -> PostgresStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
        let store = PostgresStore::connect(&url).await.unwrap();
        sqlx::query("TRUNCATE contracts, periods, proposals, promotions, upvotes, votes")
            .execute(&store.pool().await)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn conformance_suite() {
        let s = fresh_store().await;
        conformance::contract_only_updates_active(&s).await;
        conformance::period_upsert_is_idempotent(&s).await;
        conformance::period_hashes_union_and_promotion_set_once(&s).await;
        conformance::upvotes_converge_to_row_sum(&s).await;
        conformance::promotion_tallies_never_regress(&s).await;
        conformance::votes_are_append_only(&s).await;
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn concurrent_first_writes_keep_every_hash() {
        let s = fresh_store().await;
        conformance::concurrent_first_writes_keep_every_hash(&s).await;
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn reconnect_keeps_data() {
        let s = fresh_store().await;
        conformance::last_processed_period_is_highest_index(&s).await;
        s.reconnect().await.unwrap();
        assert_eq!(s.periods(crate::fixtures::CONTRACT).await.unwrap().len(), 3);
        assert_eq!(s.schema_version().await.unwrap(), Some(SCHEMA_VERSION));
    }
}
