use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    GameWin,
    Bonus,
    AdminAdjustment,
    ReferralBonus,
    SpinCost,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdrawal => "WITHDRAWAL",
            TransactionKind::GameWin => "GAME_WIN",
            TransactionKind::Bonus => "BONUS",
            TransactionKind::AdminAdjustment => "ADMIN_ADJUSTMENT",
            TransactionKind::ReferralBonus => "REFERRAL_BONUS",
            TransactionKind::SpinCost => "SPIN_COST",
        }
    }

    /// Deposits and withdrawals wait for adjudication; every other kind settles on creation.
    pub fn requires_approval(&self) -> bool {
        matches!(self, TransactionKind::Deposit | TransactionKind::Withdrawal)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionKind::Deposit),
            "WITHDRAWAL" => Ok(TransactionKind::Withdrawal),
            "GAME_WIN" => Ok(TransactionKind::GameWin),
            "BONUS" => Ok(TransactionKind::Bonus),
            "ADMIN_ADJUSTMENT" => Ok(TransactionKind::AdminAdjustment),
            "REFERRAL_BONUS" => Ok(TransactionKind::ReferralBonus),
            "SPIN_COST" => Ok(TransactionKind::SpinCost),
            other => Err(anyhow!("Unknown transaction kind: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Rejected,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "REJECTED" => Ok(TransactionStatus::Rejected),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(anyhow!("Unknown transaction status: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "CREDIT",
            Direction::Debit => "DEBIT",
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT" => Ok(Direction::Credit),
            "DEBIT" => Ok(Direction::Debit),
            other => Err(anyhow!("Unknown direction: {}", other)),
        }
    }
}

/// A balance movement: direction plus a non-negative magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub direction: Direction,
    pub amount_in_cents: i64,
}

impl LedgerEntry {
    pub fn credit(amount_in_cents: i64) -> Self {
        Self {
            direction: Direction::Credit,
            amount_in_cents,
        }
    }

    pub fn debit(amount_in_cents: i64) -> Self {
        Self {
            direction: Direction::Debit,
            amount_in_cents,
        }
    }

    /// Negative deltas become debits, everything else a credit. `None` for `i64::MIN`,
    /// whose magnitude does not fit.
    pub fn from_signed(delta_in_cents: i64) -> Option<Self> {
        let magnitude = delta_in_cents.checked_abs()?;
        if delta_in_cents < 0 {
            Some(Self::debit(magnitude))
        } else {
            Some(Self::credit(magnitude))
        }
    }

    pub fn signed(&self) -> i64 {
        match self.direction {
            Direction::Credit => self.amount_in_cents,
            Direction::Debit => -self.amount_in_cents,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Transaction {
    pub id: String,
    pub account_key: String,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount_in_cents: i64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub details: String,
}

impl Transaction {
    pub fn entry(&self) -> LedgerEntry {
        LedgerEntry {
            direction: self.direction,
            amount_in_cents: self.amount_in_cents,
        }
    }

    /// Admin notes are appended, never replacing what is already there.
    pub fn append_note(&mut self, note: &str) {
        if note.trim().is_empty() {
            return;
        }
        self.details.push_str(&format!(" [Admin: {}]", note.trim()));
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransactionFilter {
    pub account_key: Option<String>,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    /// Inclusive first day.
    pub start: Option<NaiveDate>,
    /// Inclusive last day.
    pub end: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdjudicationRequest {
    pub decision: Decision,
    pub note: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FailureRequest {
    pub note: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdjustmentRequest {
    pub amount_in_cents: i64,
    pub kind: Option<TransactionKind>,
    pub note: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DepositRequest {
    pub amount_in_cents: i64,
    pub reference: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount_in_cents: i64,
    pub destination: String,
}
