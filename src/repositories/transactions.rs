use crate::models::transactions::{
    LedgerEntry, Transaction, TransactionFilter, TransactionKind, TransactionStatus,
};

use anyhow::{anyhow, bail};
use chrono::{Days, Local, NaiveDate, NaiveTime, SubsecRound, TimeDelta, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

const SELECT_TRANSACTION: &str = r#"
    SELECT id, account_key, kind, direction, amount_in_cents, status, created_at, details
    FROM transactions
"#;

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: String,
    account_key: String,
    kind: String,
    direction: String,
    amount_in_cents: i64,
    status: String,
    created_at: i64,
    details: String,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = anyhow::Error;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            kind: row.kind.parse()?,
            direction: row.direction.parse()?,
            status: row.status.parse()?,
            created_at: chrono::DateTime::from_timestamp_millis(row.created_at)
                .ok_or_else(|| anyhow!("Invalid creation time for transaction {}", row.id))?,
            id: row.id,
            account_key: row.account_key,
            amount_in_cents: row.amount_in_cents,
            details: row.details,
        })
    }
}

#[derive(Clone)]
pub struct TransactionRepository {
    conn: SqlitePool,
}

impl TransactionRepository {
    pub fn new(conn: SqlitePool) -> Self {
        TransactionRepository { conn }
    }

    pub async fn new_transaction_in(
        &self,
        conn: &mut SqliteConnection,
        account_key: &str,
        kind: TransactionKind,
        entry: LedgerEntry,
        status: TransactionStatus,
        details: &str,
    ) -> Result<Transaction, anyhow::Error> {
        let transaction = Transaction {
            id: Uuid::now_v7().hyphenated().to_string(),
            account_key: account_key.to_string(),
            kind,
            direction: entry.direction,
            amount_in_cents: entry.amount_in_cents,
            status,
            created_at: Utc::now().trunc_subsecs(3),
            details: details.to_string(),
        };

        sqlx::query(
            r#"
                INSERT INTO transactions
                (id, account_key, kind, direction, amount_in_cents, status, created_at, details)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.account_key)
        .bind(transaction.kind.as_str())
        .bind(transaction.direction.as_str())
        .bind(transaction.amount_in_cents)
        .bind(transaction.status.as_str())
        .bind(transaction.created_at.timestamp_millis())
        .bind(&transaction.details)
        .execute(&mut *conn)
        .await?;

        Ok(transaction)
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        self.get_transaction_in(&mut conn, id).await
    }

    pub async fn get_transaction_in(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> Result<Option<Transaction>, anyhow::Error> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!("{} WHERE id = $1", SELECT_TRANSACTION))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Transaction::try_from).transpose()
    }

    /// Persists a new status and the (append-only) details of an existing transaction.
    pub async fn update_transaction_status_in(
        &self,
        conn: &mut SqliteConnection,
        transaction: &Transaction,
    ) -> Result<(), anyhow::Error> {
        let result = sqlx::query("UPDATE transactions SET status = $1, details = $2 WHERE id = $3")
            .bind(transaction.status.as_str())
            .bind(&transaction.details)
            .bind(&transaction.id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            bail!("Transaction not found: {}", transaction.id);
        }

        Ok(())
    }

    /// Most recent first. Date bounds are whole server-local days, `end` inclusive, the
    /// same calendar the daily spin reset uses.
    pub async fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, anyhow::Error> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_TRANSACTION);
        query.push(" WHERE 1 = 1");

        if let Some(account_key) = &filter.account_key {
            query.push(" AND account_key = ").push_bind(account_key.clone());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(start) = filter.start {
            query
                .push(" AND created_at >= ")
                .push_bind(local_day_start(start)?);
        }
        if let Some(end) = filter.end {
            let next_day = end
                .checked_add_days(Days::new(1))
                .ok_or_else(|| anyhow!("End date out of range."))?;
            query
                .push(" AND created_at < ")
                .push_bind(local_day_start(next_day)?);
        }
        query.push(" ORDER BY seq DESC");

        let rows = query
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.conn)
            .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }
}

/// Millis at which `day` begins on the local clock. Where a DST jump skips midnight the
/// day starts at the first instant that exists.
fn local_day_start(day: NaiveDate) -> Result<i64, anyhow::Error> {
    let midnight = day.and_time(NaiveTime::MIN);
    (0..=2)
        .find_map(|hours| {
            (midnight + TimeDelta::hours(hours))
                .and_local_timezone(Local)
                .earliest()
        })
        .map(|start| start.timestamp_millis())
        .ok_or_else(|| anyhow!("No local start for {}.", day))
}
