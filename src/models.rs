pub mod accounts;
pub mod advisory;
pub mod constants;
pub mod referrals;
pub mod rewards;
pub mod transactions;
