use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where an account stands in referral onboarding. Moves out of `Undecided`
/// exactly once and never comes back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "state", content = "code", rename_all = "snake_case")]
pub enum ReferralDecision {
    #[default]
    Undecided,
    ReferredBy(String),
    Skipped,
}

impl ReferralDecision {
    pub fn is_undecided(&self) -> bool {
        matches!(self, ReferralDecision::Undecided)
    }

    pub fn referred_by(&self) -> Option<&str> {
        match self {
            ReferralDecision::ReferredBy(code) => Some(code),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ReferralDecision::Skipped)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Account {
    pub id: String,
    pub external_key: String,
    pub balance_in_cents: i64,
    pub free_spins_remaining: i64,
    pub last_reset_date: NaiveDate,
    pub referral_code: String,
    pub referral: ReferralDecision,
    pub total_referrals_made: i64,
    pub created_at: DateTime<Utc>,
}

/// Non-financial field updates. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AccountPatch {
    pub free_spins_remaining: Option<i64>,
    pub last_reset_date: Option<NaiveDate>,
    pub referral: Option<ReferralDecision>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginRequest {
    pub external_key: String,
}
