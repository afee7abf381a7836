use chrono::NaiveDate;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use super::ServiceError;
use crate::models::accounts::{Account, AccountPatch, ReferralDecision};
use crate::models::constants::DAILY_FREE_SPINS;
use crate::models::transactions::{
    LedgerEntry, Transaction, TransactionFilter, TransactionKind, TransactionStatus,
};
use crate::repositories::{accounts::AccountRepository, transactions::TransactionRepository};

pub mod locks;

use locks::{AccountGuard, AccountLocks};

/// Applies balance changes and records the paired transaction in the same database
/// transaction. Mutations of one account are serialized through its write section.
///
/// The engine does not enforce a balance floor; callers that must not overdraw check
/// before debiting.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    accounts: AccountRepository,
    transactions: TransactionRepository,
    locks: AccountLocks,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            locks: AccountLocks::new(),
            pool,
        }
    }

    pub(crate) fn transactions(&self) -> &TransactionRepository {
        &self.transactions
    }

    pub(crate) async fn lock(&self, external_key: &str) -> AccountGuard {
        self.locks.acquire(external_key).await
    }

    pub(crate) async fn lock_pair(&self, first: &str, second: &str) -> AccountGuard {
        self.locks.acquire_pair(first, second).await
    }

    /// Sections read before they write, so the SQLite write lock is taken up front.
    pub(crate) async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>, ServiceError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Finds the account for `external_key`, creating it on first sight. Also performs
    /// the daily free-spin reset when `today` is a new day for the account.
    pub async fn login_or_create(
        &self,
        external_key: &str,
        today: NaiveDate,
    ) -> Result<Account, ServiceError> {
        let external_key = external_key.trim();
        if external_key.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Account key must not be empty.".to_string(),
            ));
        }

        let _guard = self.lock(external_key).await;
        let mut tx = self.begin().await?;

        let account = match self
            .accounts
            .get_account_in(&mut tx, external_key)
            .await
            .map_err(ServiceError::repository("Ledger"))?
        {
            Some(mut account) => {
                if reset_if_new_day(&mut account, today) {
                    self.accounts
                        .save_account_in(&mut tx, &account)
                        .await
                        .map_err(ServiceError::repository("Ledger"))?;
                    log::info!("Daily spins reset for {}.", external_key);
                }
                account
            }
            None => {
                let account = self
                    .accounts
                    .insert_account_in(&mut tx, external_key, today)
                    .await
                    .map_err(ServiceError::repository("Ledger"))?;
                log::info!("Created account {} for {}.", account.id, external_key);
                account
            }
        };

        tx.commit().await?;
        Ok(account)
    }

    pub async fn get_account(&self, external_key: &str) -> Result<Account, ServiceError> {
        self.accounts
            .get_account(external_key)
            .await
            .map_err(ServiceError::repository("Ledger"))?
            .ok_or_else(|| ServiceError::NotFound(format!("Account {}", external_key)))
    }

    pub(crate) async fn find_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<Account>, ServiceError> {
        self.accounts
            .get_account_by_referral_code(referral_code)
            .await
            .map_err(ServiceError::repository("Ledger"))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, ServiceError> {
        self.accounts
            .list_accounts()
            .await
            .map_err(ServiceError::repository("Ledger"))
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Transaction, ServiceError> {
        self.transactions
            .get_transaction(id)
            .await
            .map_err(ServiceError::repository("Ledger"))?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {}", id)))
    }

    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, ServiceError> {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start > end {
                return Err(ServiceError::InvalidInput(
                    "Start date is after end date.".to_string(),
                ));
            }
        }

        self.transactions
            .get_transactions(filter)
            .await
            .map_err(ServiceError::repository("Ledger"))
    }

    /// Moves the balance by `entry` and records a settled transaction of `kind`.
    pub async fn apply(
        &self,
        external_key: &str,
        entry: LedgerEntry,
        kind: TransactionKind,
        details: &str,
    ) -> Result<(Account, Transaction), ServiceError> {
        let _guard = self.lock(external_key).await;
        let mut tx = self.begin().await?;

        let mut account = self.load_in(&mut tx, external_key).await?;
        let transaction = self
            .apply_in(&mut tx, &mut account, entry, kind, details)
            .await?;

        tx.commit().await?;
        log::info!(
            "{} {} of {} cents on {}.",
            kind,
            entry.direction.as_str(),
            entry.amount_in_cents,
            external_key
        );

        Ok((account, transaction))
    }

    pub async fn credit(
        &self,
        external_key: &str,
        amount_in_cents: i64,
        kind: TransactionKind,
        details: &str,
    ) -> Result<(Account, Transaction), ServiceError> {
        self.apply(external_key, LedgerEntry::credit(amount_in_cents), kind, details)
            .await
    }

    pub async fn debit(
        &self,
        external_key: &str,
        amount_in_cents: i64,
        kind: TransactionKind,
        details: &str,
    ) -> Result<(Account, Transaction), ServiceError> {
        self.apply(external_key, LedgerEntry::debit(amount_in_cents), kind, details)
            .await
    }

    /// Operator-side signed adjustment. Deposits and withdrawals have their own workflow
    /// and cannot be booked here.
    pub async fn adjust_balance(
        &self,
        external_key: &str,
        delta_in_cents: i64,
        kind: Option<TransactionKind>,
        note: Option<&str>,
    ) -> Result<(Account, Transaction), ServiceError> {
        let kind = kind.unwrap_or(TransactionKind::AdminAdjustment);
        if kind.requires_approval() {
            return Err(ServiceError::InvalidInput(format!(
                "{} must go through the approval workflow.",
                kind
            )));
        }

        let entry = LedgerEntry::from_signed(delta_in_cents).ok_or_else(|| {
            ServiceError::InvalidInput("Adjustment amount out of range.".to_string())
        })?;

        let details = match note.map(str::trim) {
            Some(note) if !note.is_empty() => note,
            _ => "Manual Adjustment",
        };

        self.apply(external_key, entry, kind, details).await
    }

    /// Updates non-financial fields. No transaction is recorded.
    pub async fn patch(
        &self,
        external_key: &str,
        patch: AccountPatch,
    ) -> Result<Account, ServiceError> {
        let _guard = self.lock(external_key).await;
        let mut tx = self.begin().await?;

        let mut account = self.load_in(&mut tx, external_key).await?;
        apply_patch(&mut account, patch)?;
        self.save_in(&mut tx, &account).await?;

        tx.commit().await?;
        Ok(account)
    }

    pub async fn refresh_daily_spins(
        &self,
        external_key: &str,
        today: NaiveDate,
    ) -> Result<Account, ServiceError> {
        let _guard = self.lock(external_key).await;
        let mut tx = self.begin().await?;

        let mut account = self.load_in(&mut tx, external_key).await?;
        if reset_if_new_day(&mut account, today) {
            self.save_in(&mut tx, &account).await?;
            log::info!("Daily spins reset for {}.", external_key);
        }

        tx.commit().await?;
        Ok(account)
    }

    // The methods below run inside a write section the caller already holds.

    pub(crate) async fn load_in(
        &self,
        conn: &mut SqliteConnection,
        external_key: &str,
    ) -> Result<Account, ServiceError> {
        self.accounts
            .get_account_in(conn, external_key)
            .await
            .map_err(ServiceError::repository("Ledger"))?
            .ok_or_else(|| ServiceError::NotFound(format!("Account {}", external_key)))
    }

    pub(crate) async fn find_by_referral_code_in(
        &self,
        conn: &mut SqliteConnection,
        referral_code: &str,
    ) -> Result<Option<Account>, ServiceError> {
        self.accounts
            .get_account_by_referral_code_in(conn, referral_code)
            .await
            .map_err(ServiceError::repository("Ledger"))
    }

    pub(crate) async fn save_in(
        &self,
        conn: &mut SqliteConnection,
        account: &Account,
    ) -> Result<(), ServiceError> {
        self.accounts
            .save_account_in(conn, account)
            .await
            .map_err(ServiceError::repository("Ledger"))
    }

    pub(crate) async fn apply_in(
        &self,
        conn: &mut SqliteConnection,
        account: &mut Account,
        entry: LedgerEntry,
        kind: TransactionKind,
        details: &str,
    ) -> Result<Transaction, ServiceError> {
        if entry.amount_in_cents < 0 {
            return Err(ServiceError::InvalidInput(
                "Amount must not be negative.".to_string(),
            ));
        }
        account.balance_in_cents = account
            .balance_in_cents
            .checked_add(entry.signed())
            .ok_or_else(|| ServiceError::InvalidInput("Balance overflow.".to_string()))?;

        self.save_in(conn, account).await?;
        self.record_in(conn, &account.external_key, kind, entry, TransactionStatus::Success, details)
            .await
    }

    pub(crate) async fn record_in(
        &self,
        conn: &mut SqliteConnection,
        external_key: &str,
        kind: TransactionKind,
        entry: LedgerEntry,
        status: TransactionStatus,
        details: &str,
    ) -> Result<Transaction, ServiceError> {
        self.transactions
            .new_transaction_in(conn, external_key, kind, entry, status, details)
            .await
            .map_err(ServiceError::repository("Ledger"))
    }
}

/// Resets the free-spin allotment when `today` differs from the last reset day.
pub(crate) fn reset_if_new_day(account: &mut Account, today: NaiveDate) -> bool {
    if account.last_reset_date == today {
        return false;
    }

    account.free_spins_remaining = DAILY_FREE_SPINS;
    account.last_reset_date = today;
    true
}

fn apply_patch(account: &mut Account, patch: AccountPatch) -> Result<(), ServiceError> {
    if let Some(free_spins) = patch.free_spins_remaining {
        if free_spins < 0 {
            return Err(ServiceError::InvalidInput(
                "Free spins cannot be negative.".to_string(),
            ));
        }
    }

    if let Some(referral) = &patch.referral {
        if !account.referral.is_undecided() || *referral == ReferralDecision::Undecided {
            return Err(ServiceError::AlreadyDecided(format!(
                "Referral decision for {} cannot change.",
                account.external_key
            )));
        }
    }

    if let Some(free_spins) = patch.free_spins_remaining {
        account.free_spins_remaining = free_spins;
    }
    if let Some(last_reset_date) = patch.last_reset_date {
        account.last_reset_date = last_reset_date;
    }
    if let Some(referral) = patch.referral {
        account.referral = referral;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_pool;
    use futures_util::future::join_all;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    async fn ledger() -> Ledger {
        Ledger::new(test_pool().await)
    }

    #[tokio::test]
    async fn test_login_creates_once() {
        let ledger = ledger().await;

        let account = ledger.login_or_create("9876543210", today()).await.unwrap();
        assert_eq!(account.balance_in_cents, 0);
        assert_eq!(account.free_spins_remaining, DAILY_FREE_SPINS);
        assert_eq!(account.referral, ReferralDecision::Undecided);
        assert_eq!(account.last_reset_date, today());

        let again = ledger.login_or_create("9876543210", today()).await.unwrap();
        assert_eq!(again.id, account.id);
        assert_eq!(ledger.list_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_login_rejects_blank_key() {
        let ledger = ledger().await;
        let result = ledger.login_or_create("   ", today()).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_login_on_new_day_resets_spins() {
        let ledger = ledger().await;
        ledger.login_or_create("9876543210", today()).await.unwrap();
        ledger
            .patch(
                "9876543210",
                AccountPatch {
                    free_spins_remaining: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let same_day = ledger.login_or_create("9876543210", today()).await.unwrap();
        assert_eq!(same_day.free_spins_remaining, 0);

        let tomorrow = today().succ_opt().unwrap();
        let next_day = ledger.login_or_create("9876543210", tomorrow).await.unwrap();
        assert_eq!(next_day.free_spins_remaining, DAILY_FREE_SPINS);
        assert_eq!(next_day.last_reset_date, tomorrow);

        let history = ledger
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_apply_records_magnitude_and_direction() {
        let ledger = ledger().await;
        ledger.login_or_create("111", today()).await.unwrap();

        let (account, credit) = ledger
            .credit("111", 5_000, TransactionKind::Bonus, "Welcome")
            .await
            .unwrap();
        assert_eq!(account.balance_in_cents, 5_000);
        assert_eq!(credit.amount_in_cents, 5_000);
        assert_eq!(credit.status, TransactionStatus::Success);

        let (account, debit) = ledger
            .adjust_balance("111", -1_000, Some(TransactionKind::SpinCost), Some("Spin Fee"))
            .await
            .unwrap();
        assert_eq!(account.balance_in_cents, 4_000);
        assert_eq!(debit.amount_in_cents, 1_000);
        assert_eq!(debit.entry().signed(), -1_000);
        assert_eq!(debit.details, "Spin Fee");
    }

    #[tokio::test]
    async fn test_apply_unknown_account() {
        let ledger = ledger().await;
        let result = ledger
            .credit("404", 100, TransactionKind::Bonus, "Welcome")
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));

        let history = ledger
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_adjustment_refuses_workflow_kinds() {
        let ledger = ledger().await;
        ledger.login_or_create("111", today()).await.unwrap();

        let result = ledger
            .adjust_balance("111", 10_000, Some(TransactionKind::Deposit), None)
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert_eq!(ledger.get_account("111").await.unwrap().balance_in_cents, 0);
    }

    #[tokio::test]
    async fn test_admin_adjustment_defaults() {
        let ledger = ledger().await;
        ledger.login_or_create("111", today()).await.unwrap();

        let (_, transaction) = ledger
            .adjust_balance("111", -10_000, None, None)
            .await
            .unwrap();
        assert_eq!(transaction.kind, TransactionKind::AdminAdjustment);
        assert_eq!(transaction.details, "Manual Adjustment");
        assert_eq!(
            ledger.get_account("111").await.unwrap().balance_in_cents,
            -10_000
        );
    }

    #[tokio::test]
    async fn test_balance_equals_sum_of_operations() {
        let ledger = ledger().await;
        ledger.login_or_create("111", today()).await.unwrap();
        let deltas: Vec<i64> = vec![500, -200, 1_000, -50, 75, -325, 2_000];

        let tasks = deltas.iter().map(|delta| {
            let ledger = ledger.clone();
            let delta = *delta;
            async move { ledger.adjust_balance("111", delta, None, None).await }
        });
        for result in join_all(tasks).await {
            result.unwrap();
        }

        let account = ledger.get_account("111").await.unwrap();
        assert_eq!(account.balance_in_cents, deltas.iter().sum::<i64>());

        let settled = ledger
            .list_transactions(&TransactionFilter {
                account_key: Some("111".to_string()),
                status: Some(TransactionStatus::Success),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(settled.len(), deltas.len());
        let replayed: i64 = settled.iter().map(|t| t.entry().signed()).sum();
        assert_eq!(replayed, account.balance_in_cents);
    }

    #[tokio::test]
    async fn test_patch_referral_decision_is_one_shot() {
        let ledger = ledger().await;
        ledger.login_or_create("111", today()).await.unwrap();

        let back_to_undecided = ledger
            .patch(
                "111",
                AccountPatch {
                    referral: Some(ReferralDecision::Undecided),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            back_to_undecided,
            Err(ServiceError::AlreadyDecided(_))
        ));

        let skipped = ledger
            .patch(
                "111",
                AccountPatch {
                    referral: Some(ReferralDecision::Skipped),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(skipped.referral, ReferralDecision::Skipped);

        let changed = ledger
            .patch(
                "111",
                AccountPatch {
                    referral: Some(ReferralDecision::ReferredBy("ABC123".to_string())),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(changed, Err(ServiceError::AlreadyDecided(_))));
        assert_eq!(
            ledger.get_account("111").await.unwrap().referral,
            ReferralDecision::Skipped
        );
    }

    #[tokio::test]
    async fn test_patch_rejects_negative_spins() {
        let ledger = ledger().await;
        ledger.login_or_create("111", today()).await.unwrap();

        let result = ledger
            .patch(
                "111",
                AccountPatch {
                    free_spins_remaining: Some(-1),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_extreme_amounts_are_refused() {
        let ledger = ledger().await;
        ledger.login_or_create("111", today()).await.unwrap();
        ledger.adjust_balance("111", 1, None, None).await.unwrap();

        let min = ledger.adjust_balance("111", i64::MIN, None, None).await;
        assert!(matches!(min, Err(ServiceError::InvalidInput(_))));
        let overflow = ledger.adjust_balance("111", i64::MAX, None, None).await;
        assert!(matches!(overflow, Err(ServiceError::InvalidInput(_))));
        let negative = ledger
            .credit("111", -500, TransactionKind::Bonus, "Welcome")
            .await;
        assert!(matches!(negative, Err(ServiceError::InvalidInput(_))));

        assert_eq!(ledger.get_account("111").await.unwrap().balance_in_cents, 1);
        let history = ledger
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_writes_on_shared_file_pool() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
        let pool = crate::repositories::connect(&url, 4).await.unwrap();
        crate::repositories::migrate(&pool).await.unwrap();
        let ledger = Ledger::new(pool);

        let keys: Vec<String> = (0..8).map(|i| format!("acct-{}", i)).collect();
        for key in &keys {
            ledger.login_or_create(key, today()).await.unwrap();
        }

        let mut tasks = Vec::new();
        for key in &keys {
            for _ in 0..25 {
                let ledger = ledger.clone();
                let key = key.clone();
                tasks.push(tokio::spawn(async move {
                    ledger
                        .credit(&key, 1, TransactionKind::Bonus, "Welcome")
                        .await
                }));
            }
        }

        let errors: Vec<String> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| joined.unwrap().err().map(|e| e.to_string()))
            .collect();
        assert!(errors.is_empty(), "{} failed, first: {:?}", errors.len(), errors.first());

        for key in &keys {
            assert_eq!(ledger.get_account(key).await.unwrap().balance_in_cents, 25);
        }
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

        let pool = crate::repositories::connect(&url, 1).await.unwrap();
        crate::repositories::migrate(&pool).await.unwrap();
        let ledger = Ledger::new(pool.clone());
        let created = ledger.login_or_create("111", today()).await.unwrap();
        ledger
            .credit("111", 7_500, TransactionKind::Bonus, "Welcome")
            .await
            .unwrap();
        pool.close().await;

        let pool = crate::repositories::connect(&url, 1).await.unwrap();
        crate::repositories::migrate(&pool).await.unwrap();
        let ledger = Ledger::new(pool);
        let account = ledger.login_or_create("111", today()).await.unwrap();
        assert_eq!(account.id, created.id);
        assert_eq!(account.referral_code, created.referral_code);
        assert_eq!(account.balance_in_cents, 7_500);

        let history = ledger
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].details, "Welcome");
    }

    #[tokio::test]
    async fn test_list_transactions_rejects_inverted_range() {
        let ledger = ledger().await;
        let result = ledger
            .list_transactions(&TransactionFilter {
                start: Some(today()),
                end: today().pred_opt(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}
