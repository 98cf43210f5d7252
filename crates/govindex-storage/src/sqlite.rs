//! SQLite storage backend for GovIndex.
//!
//! Persists contracts, periods, proposals, promotions, upvotes and votes to a
//! single SQLite file. Uses `sqlx` with WAL mode for concurrent reads.
//! Merge rules run read-modify-write inside one transaction per upsert.
//!
//! # Usage
//! ```rust,no_run
//! use govindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./govindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use govindex_core::error::IndexerError;
use govindex_core::model::{
    Ballot, ContractConfig, GovernanceTrack, Period, Promotion, Proposal, Upvote, Vote,
};
use govindex_core::store::GovernanceStore;

use crate::SCHEMA_VERSION;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_migrations (
        version    INTEGER PRIMARY KEY,
        applied_at TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS contracts (
        address                 TEXT    PRIMARY KEY,
        track                   TEXT    NOT NULL,
        started_at_level        INTEGER NOT NULL,
        period_length           INTEGER NOT NULL,
        adoption_period_sec     INTEGER NOT NULL,
        upvoting_limit          INTEGER NOT NULL,
        proposal_quorum         INTEGER NOT NULL,
        promotion_quorum        INTEGER NOT NULL,
        promotion_supermajority INTEGER NOT NULL,
        active                  INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS periods (
        contract_address      TEXT    NOT NULL,
        contract_voting_index INTEGER NOT NULL,
        level_start           INTEGER NOT NULL,
        level_end             INTEGER NOT NULL,
        date_start            TEXT    NOT NULL,
        date_end              TEXT    NOT NULL,
        total_voting_power    INTEGER NOT NULL,
        proposal_hashes       TEXT    NOT NULL,
        promotion_hash        TEXT,
        PRIMARY KEY (contract_address, contract_voting_index)
    )",
    "CREATE TABLE IF NOT EXISTS proposals (
        contract_address      TEXT    NOT NULL,
        proposal_hash         TEXT    NOT NULL,
        contract_period_index INTEGER NOT NULL,
        level                 INTEGER NOT NULL,
        time                  TEXT    NOT NULL,
        transaction_hash      TEXT    NOT NULL,
        proposer              TEXT    NOT NULL,
        alias                 TEXT,
        upvotes               INTEGER NOT NULL,
        PRIMARY KEY (contract_address, proposal_hash)
    )",
    "CREATE TABLE IF NOT EXISTS promotions (
        contract_address      TEXT    NOT NULL,
        proposal_hash         TEXT    NOT NULL,
        contract_period_index INTEGER NOT NULL,
        yea_voting_power      INTEGER NOT NULL,
        nay_voting_power      INTEGER NOT NULL,
        pass_voting_power     INTEGER NOT NULL,
        total_voting_power    INTEGER NOT NULL,
        PRIMARY KEY (contract_address, proposal_hash)
    )",
    "CREATE TABLE IF NOT EXISTS upvotes (
        contract_address      TEXT    NOT NULL,
        contract_period_index INTEGER NOT NULL,
        proposal_hash         TEXT    NOT NULL,
        level                 INTEGER NOT NULL,
        time                  TEXT    NOT NULL,
        transaction_hash      TEXT    NOT NULL,
        baker                 TEXT    NOT NULL,
        alias                 TEXT,
        voting_power          INTEGER NOT NULL,
        sender                TEXT    NOT NULL,
        PRIMARY KEY (transaction_hash, baker)
    )",
    "CREATE TABLE IF NOT EXISTS votes (
        contract_address      TEXT    NOT NULL,
        contract_period_index INTEGER NOT NULL,
        proposal_hash         TEXT    NOT NULL,
        level                 INTEGER NOT NULL,
        time                  TEXT    NOT NULL,
        transaction_hash      TEXT    NOT NULL,
        baker                 TEXT    NOT NULL,
        alias                 TEXT,
        voting_power          INTEGER NOT NULL,
        vote                  TEXT    NOT NULL,
        sender                TEXT    NOT NULL,
        PRIMARY KEY (transaction_hash, baker)
    )",
    "CREATE INDEX IF NOT EXISTS idx_upvotes_proposal ON upvotes (contract_address, proposal_hash)",
    "CREATE INDEX IF NOT EXISTS idx_votes_contract ON votes (contract_address, level)",
];

const REFRESH_UPVOTES: &str = "UPDATE proposals
     SET upvotes = MAX(upvotes, (
         SELECT COALESCE(SUM(u.voting_power), 0) FROM upvotes u
         WHERE u.contract_address = proposals.contract_address
           AND u.proposal_hash = proposals.proposal_hash))
     WHERE contract_address = ? AND proposal_hash = ?";

fn storage(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed governance store.
///
/// The pool sits behind a lock so [`GovernanceStore::reconnect`] can swap it.
pub struct SqliteStore {
    /// `None` for in-memory databases, which cannot be reopened.
    options: Option<SqliteConnectOptions>,
    pool: RwLock<SqlitePool>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./govindex.db"`) or a full
    /// SQLite URL (`"sqlite:./govindex.db"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = Self::open_pool(&options).await?;

        let store = Self {
            options: Some(options),
            pool: RwLock::new(pool),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to a single connection: every new in-memory connection would
    /// see its own empty database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;

        let store = Self {
            options: None,
            pool: RwLock::new(pool),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn open_pool(options: &SqliteConnectOptions) -> Result<SqlitePool, IndexerError> {
        SqlitePoolOptions::new()
            .connect_with(options.clone())
            .await
            .map_err(storage)
    }

    async fn pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool().await.close().await;
    }

    /// Create tables and record the schema version.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool().await).await.map_err(storage)?;
        }
        sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(SCHEMA_VERSION)
            .bind(Utc::now())
            .execute(&self.pool().await)
            .await
            .map_err(storage)?;
        debug!(version = SCHEMA_VERSION, "sqlite schema initialized");
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

fn nat(row: &SqliteRow, col: &str) -> Result<u64, IndexerError> {
    Ok(row.try_get::<i64, _>(col).map_err(storage)? as u64)
}

fn text(row: &SqliteRow, col: &str) -> Result<String, IndexerError> {
    row.try_get(col).map_err(storage)
}

fn opt_text(row: &SqliteRow, col: &str) -> Result<Option<String>, IndexerError> {
    row.try_get(col).map_err(storage)
}

fn time(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>, IndexerError> {
    row.try_get(col).map_err(storage)
}

fn contract_from_row(row: &SqliteRow) -> Result<ContractConfig, IndexerError> {
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

fn period_from_row(row: &SqliteRow) -> Result<Period, IndexerError> {
    let hashes = text(row, "proposal_hashes")?;
    Ok(Period {
        contract_address: text(row, "contract_address")?,
        contract_voting_index: nat(row, "contract_voting_index")?,
        level_start: nat(row, "level_start")?,
        level_end: nat(row, "level_end")?,
        date_start: time(row, "date_start")?,
        date_end: time(row, "date_end")?,
        total_voting_power: nat(row, "total_voting_power")?,
        proposal_hashes: serde_json::from_str(&hashes)
            .map_err(|e| IndexerError::Storage(format!("proposal_hashes: {e}")))?,
        promotion_hash: opt_text(row, "promotion_hash")?,
    })
}

fn proposal_from_row(row: &SqliteRow) -> Result<Proposal, IndexerError> {
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

fn promotion_from_row(row: &SqliteRow) -> Result<Promotion, IndexerError> {
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

fn upvote_from_row(row: &SqliteRow) -> Result<Upvote, IndexerError> {
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

fn vote_from_row(row: &SqliteRow) -> Result<Vote, IndexerError> {
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
impl GovernanceStore for SqliteStore {
    async fn upsert_contract(&self, c: &ContractConfig) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO contracts
             (address, track, started_at_level, period_length, adoption_period_sec, upvoting_limit,
              proposal_quorum, promotion_quorum, promotion_supermajority, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (address) DO UPDATE SET active = excluded.active",
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
        let mut tx = self.pool().await.begin().await.map_err(storage)?;
        let existing = sqlx::query("SELECT * FROM periods WHERE contract_address = ? AND contract_voting_index = ?")
            .bind(&period.contract_address)
            .bind(period.contract_voting_index as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;

        let merged = match existing {
            Some(row) => {
                let mut stored = period_from_row(&row)?;
                stored.merge_from(period);
                stored
            }
            None => period.clone(),
        };
        let hashes = serde_json::to_string(&merged.proposal_hashes)
            .map_err(|e| IndexerError::Storage(format!("proposal_hashes: {e}")))?;

        sqlx::query(
            "INSERT INTO periods
             (contract_address, contract_voting_index, level_start, level_end, date_start, date_end,
              total_voting_power, proposal_hashes, promotion_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (contract_address, contract_voting_index) DO UPDATE SET
                date_end = excluded.date_end,
                proposal_hashes = excluded.proposal_hashes,
                promotion_hash = excluded.promotion_hash",
        )
        .bind(&merged.contract_address)
        .bind(merged.contract_voting_index as i64)
        .bind(merged.level_start as i64)
        .bind(merged.level_end as i64)
        .bind(merged.date_start)
        .bind(merged.date_end)
        .bind(merged.total_voting_power as i64)
        .bind(&hashes)
        .bind(&merged.promotion_hash)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        debug!(contract = %period.contract_address, index = period.contract_voting_index, "period stored");
        Ok(())
    }

    async fn upsert_proposal(&self, proposal: &Proposal) -> Result<(), IndexerError> {
        let mut tx = self.pool().await.begin().await.map_err(storage)?;
        let existing = sqlx::query("SELECT * FROM proposals WHERE contract_address = ? AND proposal_hash = ?")
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
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (contract_address, proposal_hash) DO UPDATE SET
                alias = excluded.alias,
                upvotes = excluded.upvotes",
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
        let mut tx = self.pool().await.begin().await.map_err(storage)?;
        let existing = sqlx::query("SELECT * FROM promotions WHERE contract_address = ? AND proposal_hash = ?")
            .bind(&promotion.contract_address)
            .bind(&promotion.proposal_hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;

        let merged = match existing {
            Some(row) => {
                let mut stored = promotion_from_row(&row)?;
                if !stored.merge_from(promotion) {
                    debug!(
                        contract = %promotion.contract_address,
                        hash = %promotion.proposal_hash,
                        "stale promotion snapshot ignored"
                    );
                    return Ok(());
                }
                stored
            }
            None => promotion.clone(),
        };

        sqlx::query(
            "INSERT INTO promotions
             (contract_address, proposal_hash, contract_period_index, yea_voting_power,
              nay_voting_power, pass_voting_power, total_voting_power)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (contract_address, proposal_hash) DO UPDATE SET
                yea_voting_power = excluded.yea_voting_power,
                nay_voting_power = excluded.nay_voting_power,
                pass_voting_power = excluded.pass_voting_power,
                total_voting_power = excluded.total_voting_power",
        )
        .bind(&merged.contract_address)
        .bind(&merged.proposal_hash)
        .bind(merged.contract_period_index as i64)
        .bind(merged.yea_voting_power as i64)
        .bind(merged.nay_voting_power as i64)
        .bind(merged.pass_voting_power as i64)
        .bind(merged.total_voting_power as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn upsert_upvote(&self, u: &Upvote) -> Result<(), IndexerError> {
        let mut tx = self.pool().await.begin().await.map_err(storage)?;
        sqlx::query(
            "INSERT INTO upvotes
             (contract_address, contract_period_index, proposal_hash, level, time, transaction_hash,
              baker, alias, voting_power, sender)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
            "SELECT * FROM periods WHERE contract_address = ?
             ORDER BY contract_voting_index DESC LIMIT 1",
        )
        .bind(contract)
        .fetch_optional(&self.pool().await)
        .await
        .map_err(storage)?;
        row.as_ref().map(period_from_row).transpose()
    }

    async fn period(&self, contract: &str, index: u64) -> Result<Option<Period>, IndexerError> {
        let row = sqlx::query("SELECT * FROM periods WHERE contract_address = ? AND contract_voting_index = ?")
            .bind(contract)
            .bind(index as i64)
            .fetch_optional(&self.pool().await)
            .await
            .map_err(storage)?;
        row.as_ref().map(period_from_row).transpose()
    }

    async fn contract(&self, address: &str) -> Result<Option<ContractConfig>, IndexerError> {
        let row = sqlx::query("SELECT * FROM contracts WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool().await)
            .await
            .map_err(storage)?;
        row.as_ref().map(contract_from_row).transpose()
    }

    async fn periods(&self, contract: &str) -> Result<Vec<Period>, IndexerError> {
        sqlx::query("SELECT * FROM periods WHERE contract_address = ? ORDER BY contract_voting_index")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?
            .iter()
            .map(period_from_row)
            .collect()
    }

    async fn proposals(&self, contract: &str) -> Result<Vec<Proposal>, IndexerError> {
        sqlx::query("SELECT * FROM proposals WHERE contract_address = ? ORDER BY level, proposal_hash")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?
            .iter()
            .map(proposal_from_row)
            .collect()
    }

    async fn promotions(&self, contract: &str) -> Result<Vec<Promotion>, IndexerError> {
        sqlx::query("SELECT * FROM promotions WHERE contract_address = ? ORDER BY contract_period_index")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?
            .iter()
            .map(promotion_from_row)
            .collect()
    }

    async fn upvotes(&self, contract: &str) -> Result<Vec<Upvote>, IndexerError> {
        sqlx::query("SELECT * FROM upvotes WHERE contract_address = ? ORDER BY level, transaction_hash, baker")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?
            .iter()
            .map(upvote_from_row)
            .collect()
    }

    async fn votes(&self, contract: &str) -> Result<Vec<Vote>, IndexerError> {
        sqlx::query("SELECT * FROM votes WHERE contract_address = ? ORDER BY level, transaction_hash, baker")
            .bind(contract)
            .fetch_all(&self.pool().await)
            .await
            .map_err(storage)?
            .iter()
            .map(vote_from_row)
            .collect()
    }

    async fn reconnect(&self) -> Result<(), IndexerError> {
        let Some(options) = &self.options else {
            debug!("in-memory sqlite store keeps its connection");
            return Ok(());
        };
        let fresh = Self::open_pool(options).await?;
        let old = std::mem::replace(&mut *self.pool.write().await, fresh);
        old.close().await;
        warn!("sqlite pool reconnected");
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
