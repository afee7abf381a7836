use crate::models::accounts::{Account, ReferralDecision};
use crate::models::constants::{DAILY_FREE_SPINS, REFERRAL_CODE_LENGTH};

use anyhow::{anyhow, bail};
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ID_SUFFIX_LENGTH: usize = 5;
const MAX_CODE_ATTEMPTS: usize = 8;

const SELECT_ACCOUNT: &str = r#"
    SELECT external_key, id, balance_in_cents, free_spins_remaining, last_reset_date,
           referral_code, referred_by_code, referral_skipped, total_referrals_made, created_at
    FROM accounts
"#;

#[derive(sqlx::FromRow)]
struct AccountRow {
    external_key: String,
    id: String,
    balance_in_cents: i64,
    free_spins_remaining: i64,
    last_reset_date: NaiveDate,
    referral_code: String,
    referred_by_code: Option<String>,
    referral_skipped: bool,
    total_referrals_made: i64,
    created_at: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let referral = match (row.referred_by_code, row.referral_skipped) {
            (None, false) => ReferralDecision::Undecided,
            (Some(code), false) => ReferralDecision::ReferredBy(code),
            (None, true) => ReferralDecision::Skipped,
            (Some(_), true) => bail!(
                "Account {} is both referred and skipped.",
                row.external_key
            ),
        };

        let created_at = DateTime::from_timestamp_millis(row.created_at)
            .ok_or_else(|| anyhow!("Invalid creation time for {}", row.external_key))?;

        Ok(Account {
            id: row.id,
            external_key: row.external_key,
            balance_in_cents: row.balance_in_cents,
            free_spins_remaining: row.free_spins_remaining,
            last_reset_date: row.last_reset_date,
            referral_code: row.referral_code,
            referral,
            total_referrals_made: row.total_referrals_made,
            created_at,
        })
    }
}

#[derive(Clone)]
pub struct AccountRepository {
    conn: SqlitePool,
}

impl AccountRepository {
    pub fn new(conn: SqlitePool) -> Self {
        Self { conn }
    }

    pub async fn get_account(&self, external_key: &str) -> Result<Option<Account>, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        self.get_account_in(&mut conn, external_key).await
    }

    pub async fn get_account_in(
        &self,
        conn: &mut SqliteConnection,
        external_key: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "{} WHERE external_key = $1",
            SELECT_ACCOUNT
        ))
        .bind(external_key)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Account::try_from).transpose()
    }

    pub async fn get_account_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        let mut conn = self.conn.acquire().await?;
        self.get_account_by_referral_code_in(&mut conn, referral_code)
            .await
    }

    pub async fn get_account_by_referral_code_in(
        &self,
        conn: &mut SqliteConnection,
        referral_code: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "{} WHERE referral_code = $1",
            SELECT_ACCOUNT
        ))
        .bind(referral_code)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Account::try_from).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, anyhow::Error> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "{} ORDER BY created_at ASC, external_key ASC",
            SELECT_ACCOUNT
        ))
        .fetch_all(&self.conn)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    /// Creates a fresh account with a full daily allotment of free spins.
    pub async fn insert_account_in(
        &self,
        conn: &mut SqliteConnection,
        external_key: &str,
        today: NaiveDate,
    ) -> Result<Account, anyhow::Error> {
        let created_at = Utc::now().trunc_subsecs(3);

        let mut attempt = 0;
        let (id, referral_code) = loop {
            let id = generate_account_id(created_at);
            let referral_code = referral_code_for(&id);
            if self
                .get_account_by_referral_code_in(conn, &referral_code)
                .await?
                .is_none()
            {
                break (id, referral_code);
            }

            attempt += 1;
            if attempt >= MAX_CODE_ATTEMPTS {
                bail!("Could not allocate a unique referral code.");
            }
        };

        let account = Account {
            id,
            external_key: external_key.to_string(),
            balance_in_cents: 0,
            free_spins_remaining: DAILY_FREE_SPINS,
            last_reset_date: today,
            referral_code,
            referral: ReferralDecision::Undecided,
            total_referrals_made: 0,
            created_at,
        };

        sqlx::query(
            r#"
                INSERT INTO accounts
                (external_key, id, balance_in_cents, free_spins_remaining, last_reset_date,
                 referral_code, referred_by_code, referral_skipped, total_referrals_made, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, NULL, FALSE, 0, $7)
            "#,
        )
        .bind(&account.external_key)
        .bind(&account.id)
        .bind(account.balance_in_cents)
        .bind(account.free_spins_remaining)
        .bind(account.last_reset_date)
        .bind(&account.referral_code)
        .bind(account.created_at.timestamp_millis())
        .execute(&mut *conn)
        .await?;

        Ok(account)
    }

    /// Writes every mutable column of the account back to its row.
    pub async fn save_account_in(
        &self,
        conn: &mut SqliteConnection,
        account: &Account,
    ) -> Result<(), anyhow::Error> {
        let result = sqlx::query(
            r#"
                UPDATE accounts
                SET balance_in_cents = $1,
                    free_spins_remaining = $2,
                    last_reset_date = $3,
                    referred_by_code = $4,
                    referral_skipped = $5,
                    total_referrals_made = $6
                WHERE external_key = $7
            "#,
        )
        .bind(account.balance_in_cents)
        .bind(account.free_spins_remaining)
        .bind(account.last_reset_date)
        .bind(account.referral.referred_by())
        .bind(account.referral.is_skipped())
        .bind(account.total_referrals_made)
        .bind(&account.external_key)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            bail!("Account not found: {}", account.external_key);
        }

        Ok(())
    }
}

/// Base-36 creation millis followed by a random base-36 suffix.
fn generate_account_id(created_at: DateTime<Utc>) -> String {
    let mut millis = created_at.timestamp_millis().max(0) as u64;
    let mut digits = Vec::new();
    loop {
        digits.push(BASE36[(millis % 36) as usize]);
        millis /= 36;
        if millis == 0 {
            break;
        }
    }
    digits.reverse();

    let mut rng = rand::thread_rng();
    for _ in 0..ID_SUFFIX_LENGTH {
        digits.push(BASE36[rng.gen_range(0..BASE36.len())]);
    }

    String::from_utf8_lossy(&digits).into_owned()
}

pub fn referral_code_for(account_id: &str) -> String {
    Sha256::digest(account_id.as_bytes())
        .iter()
        .take(REFERRAL_CODE_LENGTH)
        .map(|byte| BASE36[(*byte as usize) % BASE36.len()] as char)
        .collect()
}
