// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local relational store: the message log and the commit ledger.
//!
//! The local store is authoritative. A message is inserted before any remote
//! call is made and is never removed because mirroring failed; the ledger
//! records which repositories acknowledged it afterwards. The two writes are
//! separate transactions because the fan-out happens between them.
//!
//! # Tables
//!
//! ```text
//! messages          id, content, timestamp, created_at
//! repositories      id, owner, name, branch, storage_path, active, created_at
//! message_commits   message_id → messages, repository_id → repositories,
//!                   commit_hash, recorded_at   UNIQUE(message_id, repository_id)
//! ```
//!
//! Repository rows are never deleted. Removing a target only clears its
//! `active` flag, so ledger entries written while it was registered still
//! resolve to an `owner/name` key in historical reads.
//!
//! # SQLite Busy Handling
//!
//! SQLite can return SQLITE_BUSY/SQLITE_LOCKED when the database is
//! contended (the CLI and the server may share a file). Every statement is
//! retried with capped exponential backoff before the error is surfaced.

mod ledger;
mod messages;

use crate::config::DatabaseConfig;
use crate::error::{MirrorError, Result};
use crate::message::{CommitMap, Message, MirroredMessage};
use crate::target::RepositoryTarget;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the service needs from the local store.
///
/// Implemented by [`SqliteStore`]; tests substitute fakes.
pub trait MessageRepository: Send + Sync + 'static {
    /// Insert a message and return it with its assigned id and `created_at`.
    fn insert_message(&self, content: String, timestamp: String) -> BoxFuture<'_, Message>;

    /// Fetch a single message.
    fn get_message(&self, id: i64) -> BoxFuture<'_, Option<Message>>;

    /// Page of messages, newest `timestamp` first (ties: highest id first),
    /// each annotated with every ledger entry recorded for it.
    fn list_messages(&self, limit: u32, offset: u32) -> BoxFuture<'_, Vec<MirroredMessage>>;

    /// Messages with no ledger entry for `repository`, oldest first.
    fn messages_missing(&self, repository: String, limit: u32) -> BoxFuture<'_, Vec<Message>>;

    /// Make the active repository set equal to `targets`.
    fn sync_repositories(&self, targets: Vec<RepositoryTarget>) -> BoxFuture<'_, ()>;

    /// Register (or re-activate) a single repository.
    fn register_repository(&self, target: RepositoryTarget) -> BoxFuture<'_, ()>;

    /// Mark a repository inactive. Returns `false` if it was not active.
    fn deactivate_repository(&self, owner: String, name: String) -> BoxFuture<'_, bool>;

    /// Upsert ledger entries for a message. Returns how many were written.
    fn record_commits(&self, message_id: i64, commits: CommitMap) -> BoxFuture<'_, usize>;

    /// Every ledger entry for a message, keyed by `owner/name`.
    fn lookup_commits(&self, message_id: i64) -> BoxFuture<'_, CommitMap>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SQLite retry
// ═══════════════════════════════════════════════════════════════════════════════

const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
pub(crate) async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    mut f: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(operation = operation_name, attempts, "SQLite operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                crate::metrics::store_retries_total(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(operation = operation_name, attempts, "SQLite busy, max retries exceeded");
                }
                return Err(e);
            }
        }
    }
}

/// Current time in the format SQLite defaults use (`created_at`, `recorded_at`).
pub(crate) const SQL_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS repositories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        branch TEXT NOT NULL DEFAULT 'main',
        storage_path TEXT NOT NULL DEFAULT 'messages',
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE(owner, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS message_commits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id INTEGER NOT NULL REFERENCES messages(id),
        repository_id INTEGER NOT NULL REFERENCES repositories(id),
        commit_hash TEXT NOT NULL,
        recorded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE(message_id, repository_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_message_commits_message ON message_commits(message_id)",
];

// ═══════════════════════════════════════════════════════════════════════════════
// SqliteStore
// ═══════════════════════════════════════════════════════════════════════════════

/// Message store and commit ledger backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: String,
}

impl SqliteStore {
    /// Open the store described by `config`, creating the file and tables
    /// if they don't exist.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        if config.sqlite_path == ":memory:" {
            return Self::in_memory().await;
        }
        Self::open_path(&config.sqlite_path, config.wal_mode).await
    }

    /// Open (or create) a database file.
    pub async fn open_path(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Initializing message store");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let journal = if wal_mode {
            sqlx::sqlite::SqliteJournalMode::Wal
        } else {
            sqlx::sqlite::SqliteJournalMode::Delete
        };

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path_str))
            .map_err(|e| MirrorError::Config(format!("Invalid SQLite path: {}", e)))?
            .journal_mode(journal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::init(pool, path_str).await
    }

    /// Private in-memory database (tests, dry runs).
    ///
    /// Pinned to one connection that never expires: each SQLite connection
    /// to `:memory:` is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MirrorError::Config(format!("Invalid SQLite path: {}", e)))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::init(pool, ":memory:".to_string()).await
    }

    async fn init(pool: SqlitePool, path: String) -> Result<Self> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!(path = %path, "Message store schema ready");
        Ok(Self { pool, path })
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, checkpointing the WAL first.
    pub async fn close(&self) {
        let pool = &self.pool;
        let checkpoint = execute_with_retry("checkpoint", || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(pool).await
        })
        .await;
        if let Err(e) = checkpoint {
            warn!(error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!("Message store closed");
    }
}

impl MessageRepository for SqliteStore {
    fn insert_message(&self, content: String, timestamp: String) -> BoxFuture<'_, Message> {
        Box::pin(async move { self.insert(&content, &timestamp).await })
    }

    fn get_message(&self, id: i64) -> BoxFuture<'_, Option<Message>> {
        Box::pin(async move { self.get(id).await })
    }

    fn list_messages(&self, limit: u32, offset: u32) -> BoxFuture<'_, Vec<MirroredMessage>> {
        Box::pin(async move { self.page(limit, offset).await })
    }

    fn messages_missing(&self, repository: String, limit: u32) -> BoxFuture<'_, Vec<Message>> {
        Box::pin(async move { self.missing_for(&repository, limit).await })
    }

    fn sync_repositories(&self, targets: Vec<RepositoryTarget>) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.sync_targets(&targets).await })
    }

    fn register_repository(&self, target: RepositoryTarget) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.upsert_target(&target).await })
    }

    fn deactivate_repository(&self, owner: String, name: String) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.deactivate_target(&owner, &name).await })
    }

    fn record_commits(&self, message_id: i64, commits: CommitMap) -> BoxFuture<'_, usize> {
        Box::pin(async move { self.record(message_id, &commits).await })
    }

    fn lookup_commits(&self, message_id: i64) -> BoxFuture<'_, CommitMap> {
        Box::pin(async move { self.lookup(message_id).await })
    }
}
