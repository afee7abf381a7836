use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::oneshot;

use super::ledger::{reset_if_new_day, Ledger};
use super::{RequestHandler, Service, ServiceError};
use crate::models::constants::SPIN_COST_IN_CENTS;
use crate::models::rewards::SpinOutcome;
use crate::models::transactions::{LedgerEntry, TransactionKind};

pub mod selector;

use selector::Wheel;

pub enum SpinRequest {
    Spin {
        external_key: String,
        today: NaiveDate,
        response: oneshot::Sender<Result<SpinOutcome, ServiceError>>,
    },
}

/// Admits a spin, draws a segment and books the cost and the payout.
#[derive(Clone)]
pub struct SpinEngine {
    ledger: Ledger,
    wheel: Wheel,
}

impl SpinEngine {
    pub fn new(ledger: Ledger, wheel: Wheel) -> Self {
        Self { ledger, wheel }
    }

    pub fn wheel(&self) -> &Wheel {
        &self.wheel
    }

    pub async fn spin(
        &self,
        external_key: &str,
        today: NaiveDate,
    ) -> Result<SpinOutcome, ServiceError> {
        let segment_index = self.wheel.spin(&mut rand::thread_rng());
        self.spin_to(external_key, today, segment_index).await
    }

    /// Books a spin that landed on `segment_index`. A free spin is used first, then
    /// the balance is charged; with neither the spin is refused and nothing changes.
    pub(crate) async fn spin_to(
        &self,
        external_key: &str,
        today: NaiveDate,
        segment_index: usize,
    ) -> Result<SpinOutcome, ServiceError> {
        let segment = self
            .wheel
            .segment(segment_index)
            .ok_or_else(|| ServiceError::InvalidInput(format!("No segment {}.", segment_index)))?
            .clone();

        let _guard = self.ledger.lock(external_key).await;
        let mut tx = self.ledger.begin().await?;

        let mut account = self.ledger.load_in(&mut tx, external_key).await?;
        reset_if_new_day(&mut account, today);

        let free_spin = if account.free_spins_remaining > 0 {
            account.free_spins_remaining -= 1;
            self.ledger.save_in(&mut tx, &account).await?;
            true
        } else if account.balance_in_cents >= SPIN_COST_IN_CENTS {
            self.ledger
                .apply_in(
                    &mut tx,
                    &mut account,
                    LedgerEntry::debit(SPIN_COST_IN_CENTS),
                    TransactionKind::SpinCost,
                    "Spin Fee",
                )
                .await?;
            false
        } else {
            log::warn!("Spin refused for {}: insufficient balance.", external_key);
            return Err(ServiceError::InvalidInput(
                "Insufficient balance".to_string(),
            ));
        };

        if segment.payout_in_cents > 0 {
            self.ledger
                .apply_in(
                    &mut tx,
                    &mut account,
                    LedgerEntry::credit(segment.payout_in_cents),
                    TransactionKind::GameWin,
                    &format!("Won on {}", segment.label),
                )
                .await?;
        }

        tx.commit().await?;
        log::info!(
            "{} spun {} ({} cents, free: {}).",
            external_key,
            segment.label,
            segment.payout_in_cents,
            free_spin
        );

        Ok(SpinOutcome {
            segment_index,
            label: segment.label,
            payout_in_cents: segment.payout_in_cents,
            free_spin,
            account,
        })
    }
}

#[derive(Clone)]
pub struct RewardRequestHandler {
    engine: SpinEngine,
}

impl RewardRequestHandler {
    pub fn new(engine: SpinEngine) -> Self {
        RewardRequestHandler { engine }
    }
}

#[async_trait]
impl RequestHandler<SpinRequest> for RewardRequestHandler {
    async fn handle_request(&self, request: SpinRequest) {
        match request {
            SpinRequest::Spin {
                external_key,
                today,
                response,
            } => {
                let outcome = self.engine.spin(&external_key, today).await;
                let _ = response.send(outcome);
            }
        }
    }
}

pub struct RewardService;

impl RewardService {
    pub fn new() -> Self {
        RewardService {}
    }
}

#[async_trait]
impl Service<SpinRequest, RewardRequestHandler> for RewardService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::accounts::AccountPatch;
    use crate::models::constants::{CENTS_PER_UNIT, DAILY_FREE_SPINS};
    use crate::models::transactions::{Transaction, TransactionFilter, TransactionStatus};
    use crate::repositories::test_pool;

    const TRY_AGAIN: usize = 1;
    const TEN: usize = 0;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    async fn engine_with(balance_in_cents: i64, free_spins: i64) -> SpinEngine {
        let ledger = Ledger::new(test_pool().await);
        ledger.login_or_create("player", today()).await.unwrap();
        if balance_in_cents != 0 {
            ledger
                .adjust_balance("player", balance_in_cents, None, None)
                .await
                .unwrap();
        }
        ledger
            .patch(
                "player",
                AccountPatch {
                    free_spins_remaining: Some(free_spins),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        SpinEngine::new(ledger, Wheel::default())
    }

    async fn history(engine: &SpinEngine, kind: TransactionKind) -> Vec<Transaction> {
        engine
            .ledger
            .list_transactions(&TransactionFilter {
                kind: Some(kind),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_paid_spin_charges_cost() {
        let engine = engine_with(50 * CENTS_PER_UNIT, 0).await;

        let outcome = engine.spin_to("player", today(), TRY_AGAIN).await.unwrap();
        assert!(!outcome.free_spin);
        assert_eq!(outcome.payout_in_cents, 0);
        assert_eq!(outcome.account.balance_in_cents, 40 * CENTS_PER_UNIT);

        let costs = history(&engine, TransactionKind::SpinCost).await;
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].amount_in_cents, SPIN_COST_IN_CENTS);
        assert_eq!(costs[0].status, TransactionStatus::Success);
        assert_eq!(costs[0].details, "Spin Fee");
        assert!(history(&engine, TransactionKind::GameWin).await.is_empty());
    }

    #[tokio::test]
    async fn test_win_is_a_separate_entry() {
        let engine = engine_with(50 * CENTS_PER_UNIT, 0).await;

        let outcome = engine.spin_to("player", today(), TEN).await.unwrap();
        assert_eq!(outcome.label, "₹10");
        assert_eq!(outcome.account.balance_in_cents, 50 * CENTS_PER_UNIT);

        let wins = history(&engine, TransactionKind::GameWin).await;
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].amount_in_cents, 10 * CENTS_PER_UNIT);
        assert_eq!(wins[0].details, "Won on ₹10");
        assert_eq!(history(&engine, TransactionKind::SpinCost).await.len(), 1);
    }

    #[tokio::test]
    async fn test_free_spin_is_used_first() {
        let engine = engine_with(50 * CENTS_PER_UNIT, 2).await;

        let outcome = engine.spin_to("player", today(), TRY_AGAIN).await.unwrap();
        assert!(outcome.free_spin);
        assert_eq!(outcome.account.free_spins_remaining, 1);
        assert_eq!(outcome.account.balance_in_cents, 50 * CENTS_PER_UNIT);
        assert!(history(&engine, TransactionKind::SpinCost).await.is_empty());
    }

    #[tokio::test]
    async fn test_spin_refused_without_funds() {
        let engine = engine_with(5 * CENTS_PER_UNIT, 0).await;
        let before = engine.ledger.get_account("player").await.unwrap();

        let result = engine.spin_to("player", today(), TEN).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert_eq!(engine.ledger.get_account("player").await.unwrap(), before);
        assert!(history(&engine, TransactionKind::SpinCost).await.is_empty());
    }

    #[tokio::test]
    async fn test_new_day_restores_free_spins() {
        let engine = engine_with(0, 0).await;
        let tomorrow = today().succ_opt().unwrap();

        let outcome = engine.spin_to("player", tomorrow, TRY_AGAIN).await.unwrap();
        assert!(outcome.free_spin);
        assert_eq!(outcome.account.free_spins_remaining, DAILY_FREE_SPINS - 1);
        assert_eq!(outcome.account.last_reset_date, tomorrow);
    }

    #[tokio::test]
    async fn test_random_spin_keeps_books_balanced() {
        let engine = engine_with(0, 3).await;
        for _ in 0..3 {
            engine.spin("player", today()).await.unwrap();
        }

        let account = engine.ledger.get_account("player").await.unwrap();
        assert_eq!(account.free_spins_remaining, 0);
        let replayed: i64 = engine
            .ledger
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|t| t.entry().signed())
            .sum();
        assert_eq!(replayed, account.balance_in_cents);
    }

    #[tokio::test]
    async fn test_unknown_account_and_segment() {
        let engine = engine_with(0, 1).await;
        assert!(matches!(
            engine.spin("nobody", today()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            engine.spin_to("player", today(), 99).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
