use serde::{Deserialize, Serialize};

use super::accounts::Account;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WheelSegment {
    pub label: String,
    pub payout_in_cents: i64,
    pub weight: f64,
}

impl WheelSegment {
    pub fn new(label: &str, payout_in_cents: i64, weight: f64) -> Self {
        Self {
            label: label.to_string(),
            payout_in_cents,
            weight,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SpinOutcome {
    pub segment_index: usize,
    pub label: String,
    pub payout_in_cents: i64,
    pub free_spin: bool,
    pub account: Account,
}
