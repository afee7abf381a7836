use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub mod accounts;
pub mod advisory;
pub mod transactions;

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        external_key TEXT PRIMARY KEY NOT NULL,
        id TEXT NOT NULL UNIQUE,
        balance_in_cents INTEGER NOT NULL DEFAULT 0,
        free_spins_remaining INTEGER NOT NULL DEFAULT 0,
        last_reset_date TEXT NOT NULL,
        referral_code TEXT NOT NULL UNIQUE,
        referred_by_code TEXT,
        referral_skipped BOOLEAN NOT NULL DEFAULT FALSE,
        total_referrals_made INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        account_key TEXT NOT NULL,
        kind TEXT NOT NULL,
        direction TEXT NOT NULL,
        amount_in_cents INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        details TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS transactions_account_key ON transactions (account_key)",
    "CREATE INDEX IF NOT EXISTS transactions_created_at ON transactions (created_at)",
];

/// Opens the pool. Connections are never recycled so `sqlite::memory:` keeps its data
/// for the lifetime of the pool. An in-memory database is private to its connection, so
/// it always gets exactly one.
///
/// Writers open their transactions with `BEGIN IMMEDIATE` (see `Ledger::begin`) and queue
/// on the busy timeout for the single SQLite write lock.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, anyhow::Error> {
    let max_connections = if is_in_memory(url) {
        1
    } else {
        max_connections.max(1)
    };

    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), anyhow::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    log::info!("Database schema ready.");
    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:", 1)
        .await
        .expect("Could not open in-memory database.");
    migrate(&pool).await.expect("Could not create schema.");
    pool
}
