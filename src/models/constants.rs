/// One currency unit in minor units.
pub const CENTS_PER_UNIT: i64 = 100;

pub const SPIN_COST_IN_CENTS: i64 = 10 * CENTS_PER_UNIT;
pub const DAILY_FREE_SPINS: i64 = 10;
pub const MIN_WITHDRAWAL_IN_CENTS: i64 = 100 * CENTS_PER_UNIT;
pub const REFERRAL_BONUS_IN_CENTS: i64 = 200 * CENTS_PER_UNIT;

/// Approved deposits grant one free spin per this many cents.
pub const DEPOSIT_CENTS_PER_BONUS_SPIN: i64 = 100 * CENTS_PER_UNIT;

pub const REFERRAL_CODE_LENGTH: usize = 6;
pub const DEPOSIT_METHOD: &str = "UPI";
