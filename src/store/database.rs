//! SQLite storage for swap runs
//!
//! One database file holds every table:
//! - `swap_process`: per-owner run flags
//! - `swap_history`: one row per swap attempt
//! - `swap_tasks` / `swap_task_changes`: tracked tasks and per-wallet deltas
//! - `swap_strategies`: saved strategy presets

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::config::DatabaseConfig;
use crate::errors::{SwapError, SwapResult};
use crate::logger::{self, LogTag};

// =============================================================================
// CONSTANTS
// =============================================================================

const SCHEMA_VERSION: u32 = 2;
const POOL_MIN_IDLE: u32 = 1;
const CONNECTION_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// SCHEMA DEFINITIONS
// =============================================================================

const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

const SCHEMA_SWAP_PROCESS: &str = r#"
CREATE TABLE IF NOT EXISTS swap_process (
    owner TEXT PRIMARY KEY,
    is_active INTEGER NOT NULL DEFAULT 0,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    last_result TEXT NOT NULL DEFAULT '',
    run_token TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL
);
"#;

const SCHEMA_SWAP_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS swap_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    owner TEXT NOT NULL,
    wallet TEXT NOT NULL,
    pool_address TEXT NOT NULL,
    direction TEXT NOT NULL,
    status TEXT NOT NULL,
    tx_reference TEXT,

    amount_in INTEGER NOT NULL DEFAULT 0,
    amount_out INTEGER NOT NULL DEFAULT 0,
    gas_total INTEGER NOT NULL DEFAULT 0,
    gas_net INTEGER NOT NULL DEFAULT 0,

    strategy_id TEXT,
    strategy_name TEXT,
    task_id TEXT,
    job_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_swap_history_owner ON swap_history(owner);
CREATE INDEX IF NOT EXISTS idx_swap_history_status ON swap_history(status);
CREATE INDEX IF NOT EXISTS idx_swap_history_pool ON swap_history(pool_address);
CREATE INDEX IF NOT EXISTS idx_swap_history_task ON swap_history(task_id);
"#;

const SCHEMA_SWAP_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS swap_tasks (
    task_id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_swap_tasks_owner ON swap_tasks(owner);
"#;

const SCHEMA_SWAP_TASK_CHANGES: &str = r#"
CREATE TABLE IF NOT EXISTS swap_task_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    task_id TEXT NOT NULL,
    job_name TEXT NOT NULL,
    wallet TEXT NOT NULL,
    token_a_change INTEGER NOT NULL DEFAULT 0,
    token_b_change INTEGER NOT NULL DEFAULT 0,
    gas_used INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    UNIQUE(owner, task_id, job_name, wallet)
);

CREATE INDEX IF NOT EXISTS idx_swap_task_changes_task ON swap_task_changes(task_id);
"#;

const SCHEMA_SWAP_STRATEGIES: &str = r#"
CREATE TABLE IF NOT EXISTS swap_strategies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    pool_address TEXT NOT NULL,
    direction TEXT NOT NULL,
    lower_bound REAL NOT NULL,
    upper_bound REAL NOT NULL,
    decimals_a INTEGER NOT NULL,
    decimals_b INTEGER NOT NULL,
    slippage REAL NOT NULL,
    stop_threshold TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

// =============================================================================
// DATABASE HANDLE
// =============================================================================

/// Pooled SQLite handle implementing every store trait
#[derive(Clone)]
pub struct SwapDatabase {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl SwapDatabase {
    /// Opens (creating if needed) the database and applies the schema
    pub fn open(path: &Path, pool_max_size: u32) -> SwapResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA busy_timeout = 30000;
                PRAGMA foreign_keys = ON;
                PRAGMA synchronous = NORMAL;
            ",
            )
        });
        let pool = Pool::builder()
            .max_size(pool_max_size.max(1))
            .min_idle(Some(POOL_MIN_IDLE.min(pool_max_size.max(1))))
            .connection_timeout(Duration::from_millis(CONNECTION_TIMEOUT_MS))
            .build(manager)
            .map_err(|e| SwapError::Database(format!("Failed to create database pool: {}", e)))?;

        let db = Self {
            pool,
            path: path.to_path_buf(),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn from_config(config: &DatabaseConfig) -> SwapResult<Self> {
        Self::open(&config.resolved_path(), config.pool_max_size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> SwapResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| SwapError::Database(format!("Failed to get database connection: {}", e)))
    }

    fn init_schema(&self) -> SwapResult<()> {
        let conn = self.connection()?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = memory;
        ",
        )
        .map_err(|e| SwapError::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| SwapError::Database(format!("Failed to create version table: {}", e)))?;

        let current_version: Option<u32> = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SwapError::Database(format!("Failed to check schema version: {}", e)))?;

        if current_version.map_or(true, |v| v < SCHEMA_VERSION) {
            for (name, schema) in [
                ("swap_process", SCHEMA_SWAP_PROCESS),
                ("swap_history", SCHEMA_SWAP_HISTORY),
                ("swap_tasks", SCHEMA_SWAP_TASKS),
                ("swap_task_changes", SCHEMA_SWAP_TASK_CHANGES),
                ("swap_strategies", SCHEMA_SWAP_STRATEGIES),
            ] {
                conn.execute_batch(schema).map_err(|e| {
                    SwapError::Database(format!("Failed to create {} table: {}", name, e))
                })?;
            }

            // v2 added the per-run token to swap_process
            if current_version == Some(1) {
                conn.execute_batch(
                    "ALTER TABLE swap_process ADD COLUMN run_token TEXT NOT NULL DEFAULT ''",
                )
                .map_err(|e| SwapError::Database(format!("Failed to migrate swap_process: {}", e)))?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, Utc::now().to_rfc3339()],
            )
            .map_err(|e| SwapError::Database(format!("Failed to update schema version: {}", e)))?;

            logger::info(
                LogTag::Database,
                &format!(
                    "Swap database initialized at {} (schema v{})",
                    self.path.display(),
                    SCHEMA_VERSION
                ),
            );
        }

        Ok(())
    }
}

// =============================================================================
// COLUMN HELPERS
// =============================================================================

/// u64 amounts are stored as SQLite INTEGER
pub(crate) fn to_db_int(value: u64, what: &str) -> SwapResult<i64> {
    i64::try_from(value)
        .map_err(|_| SwapError::AmountOverflow(format!("{} {} exceeds INTEGER range", what, value)))
}

pub(crate) fn delta_to_db_int(value: i128, what: &str) -> SwapResult<i64> {
    i64::try_from(value)
        .map_err(|_| SwapError::AmountOverflow(format!("{} {} exceeds INTEGER range", what, value)))
}

/// Reads a non-negative INTEGER column back into u64
pub(crate) fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Surfaces enum decode failures as rusqlite conversion errors
pub(crate) fn decode_error(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}

pub(crate) fn db_error(action: &str, e: rusqlite::Error) -> SwapError {
    SwapError::Database(format!("Failed to {}: {}", action, e))
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_db;
    use super::*;

    #[test]
    fn test_schema_is_created_once() {
        let (dir, db) = temp_db();
        let conn = db.connection().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'swap_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
        drop(conn);

        // Reopening keeps the single version row
        let reopened = SwapDatabase::open(&dir.path().join("swaps.db"), 2).unwrap();
        let versions: i64 = reopened
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(to_db_int(42, "amount").unwrap(), 42);
        assert!(to_db_int(u64::MAX, "amount").is_err());
        assert!(delta_to_db_int(-5, "delta").is_ok());
        assert!(delta_to_db_int(i128::MAX, "delta").is_err());
        assert_eq!(from_db_int(-1), 0);
    }
}
