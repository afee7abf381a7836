use std::sync::Arc;
use std::time::Duration;

use super::ledger::Ledger;
use super::ServiceError;
use crate::models::accounts::Account;
use crate::models::advisory::RiskAssessment;
use crate::models::constants::{DEPOSIT_CENTS_PER_BONUS_SPIN, MIN_WITHDRAWAL_IN_CENTS};
use crate::models::transactions::{
    Decision, LedgerEntry, Transaction, TransactionKind, TransactionStatus,
};
use crate::repositories::advisory::RiskAdvisor;

const LOCAL_PART_LENGTH: std::ops::RangeInclusive<usize> = 2..=256;
const PROVIDER_LENGTH: std::ops::RangeInclusive<usize> = 2..=64;

/// Deposit and withdrawal requests, from submission to adjudication.
///
/// Deposits only touch the balance once approved. Withdrawals debit on submission and
/// are refunded if they do not go through.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    ledger: Ledger,
    advisor: Arc<dyn RiskAdvisor>,
    advisory_timeout: Duration,
    deposit_method: String,
}

impl ApprovalWorkflow {
    pub fn new(
        ledger: Ledger,
        advisor: Arc<dyn RiskAdvisor>,
        advisory_timeout: Duration,
        deposit_method: String,
    ) -> Self {
        Self {
            ledger,
            advisor,
            advisory_timeout,
            deposit_method,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn submit_deposit(
        &self,
        external_key: &str,
        amount_in_cents: i64,
        reference: &str,
    ) -> Result<Transaction, ServiceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Deposit reference is required.".to_string(),
            ));
        }
        if amount_in_cents <= 0 {
            return Err(ServiceError::InvalidInput(
                "Deposit amount must be positive.".to_string(),
            ));
        }

        self.ledger.get_account(external_key).await?;

        let (assessment, degraded) = self.assess(reference, amount_in_cents).await;
        if assessment.is_rejected() {
            log::warn!(
                "Deposit from {} refused by advisory (score {}): {}",
                external_key,
                assessment.risk_score,
                assessment.reasoning
            );
            return Err(ServiceError::AdvisoryRejected(assessment.reasoning));
        }

        let mut details = format!("UTR: {}", reference);
        if degraded {
            details.push_str(" [Review: manual]");
        }

        let _guard = self.ledger.lock(external_key).await;
        let mut tx = self.ledger.begin().await?;

        self.ledger.load_in(&mut tx, external_key).await?;
        let transaction = self
            .ledger
            .record_in(
                &mut tx,
                external_key,
                TransactionKind::Deposit,
                LedgerEntry::credit(amount_in_cents),
                TransactionStatus::Pending,
                &details,
            )
            .await?;

        tx.commit().await?;
        log::info!(
            "Deposit {} of {} cents submitted by {}.",
            transaction.id,
            amount_in_cents,
            external_key
        );

        Ok(transaction)
    }

    /// Checks, in order: destination handle, sufficient balance, minimum amount.
    pub async fn submit_withdrawal(
        &self,
        external_key: &str,
        amount_in_cents: i64,
        destination: &str,
    ) -> Result<(Account, Transaction), ServiceError> {
        let destination = destination.trim();

        let _guard = self.ledger.lock(external_key).await;
        let mut tx = self.ledger.begin().await?;

        let mut account = self.ledger.load_in(&mut tx, external_key).await?;

        if !is_valid_payment_handle(destination) {
            log::warn!("Withdrawal from {} refused: bad handle.", external_key);
            return Err(ServiceError::InvalidInput(
                "Invalid payment handle format.".to_string(),
            ));
        }
        if amount_in_cents > account.balance_in_cents {
            log::warn!("Withdrawal from {} refused: balance.", external_key);
            return Err(ServiceError::InvalidInput("Insufficient balance.".to_string()));
        }
        if amount_in_cents < MIN_WITHDRAWAL_IN_CENTS {
            log::warn!("Withdrawal from {} refused: below minimum.", external_key);
            return Err(ServiceError::InvalidInput(format!(
                "Minimum withdrawal is {} cents.",
                MIN_WITHDRAWAL_IN_CENTS
            )));
        }

        let entry = LedgerEntry::debit(amount_in_cents);
        account.balance_in_cents += entry.signed();
        self.ledger.save_in(&mut tx, &account).await?;
        let transaction = self
            .ledger
            .record_in(
                &mut tx,
                external_key,
                TransactionKind::Withdrawal,
                entry,
                TransactionStatus::Pending,
                &format!("To: {}", destination),
            )
            .await?;

        tx.commit().await?;
        log::info!(
            "Withdrawal {} of {} cents submitted by {}.",
            transaction.id,
            amount_in_cents,
            external_key
        );

        Ok((account, transaction))
    }

    pub async fn adjudicate(
        &self,
        transaction_id: &str,
        decision: Decision,
        note: Option<&str>,
    ) -> Result<Transaction, ServiceError> {
        match decision {
            Decision::Approve => self.approve(transaction_id, note).await,
            Decision::Reject => self.reject(transaction_id, note).await,
        }
    }

    pub async fn approve(
        &self,
        transaction_id: &str,
        note: Option<&str>,
    ) -> Result<Transaction, ServiceError> {
        self.settle(transaction_id, TransactionStatus::Success, note)
            .await
    }

    pub async fn reject(
        &self,
        transaction_id: &str,
        note: Option<&str>,
    ) -> Result<Transaction, ServiceError> {
        self.settle(transaction_id, TransactionStatus::Rejected, note)
            .await
    }

    /// Settlement error path. A failed withdrawal is refunded like a rejected one.
    pub async fn fail(
        &self,
        transaction_id: &str,
        note: Option<&str>,
    ) -> Result<Transaction, ServiceError> {
        self.settle(transaction_id, TransactionStatus::Failed, note)
            .await
    }

    async fn settle(
        &self,
        transaction_id: &str,
        target: TransactionStatus,
        note: Option<&str>,
    ) -> Result<Transaction, ServiceError> {
        let external_key = self
            .ledger
            .get_transaction(transaction_id)
            .await?
            .account_key;

        let _guard = self.ledger.lock(&external_key).await;
        let mut tx = self.ledger.begin().await?;

        let mut transaction = self
            .ledger
            .transactions()
            .get_transaction_in(&mut tx, transaction_id)
            .await
            .map_err(ServiceError::repository("Approvals"))?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {}", transaction_id)))?;

        if transaction.status.is_terminal() {
            log::warn!(
                "Transaction {} is already {}, refusing {}.",
                transaction_id,
                transaction.status,
                target
            );
            return Err(ServiceError::Conflict(format!(
                "Transaction {} is already {}.",
                transaction_id, transaction.status
            )));
        }
        if !transaction.kind.requires_approval() {
            return Err(ServiceError::Conflict(format!(
                "{} transactions are not adjudicated.",
                transaction.kind
            )));
        }

        let mut account = match self.ledger.load_in(&mut tx, &external_key).await {
            Ok(account) => account,
            Err(ServiceError::NotFound(what)) => {
                transaction.status = TransactionStatus::Failed;
                transaction.details.push_str(" [System: account missing]");
                self.ledger
                    .transactions()
                    .update_transaction_status_in(&mut tx, &transaction)
                    .await
                    .map_err(ServiceError::repository("Approvals"))?;
                tx.commit().await?;
                log::error!("Transaction {} failed: {} missing.", transaction_id, what);
                return Err(ServiceError::NotFound(what));
            }
            Err(e) => return Err(e),
        };

        let amount = transaction.amount_in_cents;
        let changed = match (transaction.kind, target) {
            (TransactionKind::Deposit, TransactionStatus::Success) => {
                account.balance_in_cents = credited(account.balance_in_cents, amount)?;
                account.free_spins_remaining = credited(
                    account.free_spins_remaining,
                    amount / DEPOSIT_CENTS_PER_BONUS_SPIN,
                )?;
                true
            }
            (TransactionKind::Withdrawal, TransactionStatus::Rejected)
            | (TransactionKind::Withdrawal, TransactionStatus::Failed) => {
                account.balance_in_cents = credited(account.balance_in_cents, amount)?;
                true
            }
            _ => false,
        };

        if changed {
            self.ledger.save_in(&mut tx, &account).await?;
        }

        transaction.status = target;
        if let Some(note) = note {
            transaction.append_note(note);
        }
        self.ledger
            .transactions()
            .update_transaction_status_in(&mut tx, &transaction)
            .await
            .map_err(ServiceError::repository("Approvals"))?;

        tx.commit().await?;
        log::info!(
            "{} {} marked {} for {}.",
            transaction.kind,
            transaction.id,
            target,
            external_key
        );

        Ok(transaction)
    }

    /// Consults the advisory within the configured timeout. Returns the assessment
    /// and whether it is the manual-review fallback.
    async fn assess(&self, reference: &str, amount_in_cents: i64) -> (RiskAssessment, bool) {
        let call = self
            .advisor
            .assess(reference, amount_in_cents, &self.deposit_method);

        match tokio::time::timeout(self.advisory_timeout, call).await {
            Ok(Ok(assessment)) => (assessment, false),
            Ok(Err(e)) => {
                log::warn!("Advisory unavailable, queueing manual review: {}", e);
                (RiskAssessment::manual_review(), true)
            }
            Err(_) => {
                log::warn!(
                    "Advisory timed out after {:?}, queueing manual review.",
                    self.advisory_timeout
                );
                (RiskAssessment::manual_review(), true)
            }
        }
    }
}

/// Overflow leaves the transaction pending and the account untouched.
fn credited(current: i64, amount: i64) -> Result<i64, ServiceError> {
    current
        .checked_add(amount)
        .ok_or_else(|| ServiceError::InvalidInput("Balance overflow.".to_string()))
}

/// `handle@provider`: the handle from letters, digits, `.`, `-` and `_`, the provider
/// alphabetic.
pub fn is_valid_payment_handle(destination: &str) -> bool {
    let Some((local, provider)) = destination.split_once('@') else {
        return false;
    };

    LOCAL_PART_LENGTH.contains(&local.len())
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        && PROVIDER_LENGTH.contains(&provider.len())
        && provider.chars().all(|c| c.is_ascii_alphabetic())
}
