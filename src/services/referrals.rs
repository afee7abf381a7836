use async_trait::async_trait;
use tokio::sync::oneshot;

use super::ledger::Ledger;
use super::{RequestHandler, Service, ServiceError};
use crate::models::accounts::ReferralDecision;
use crate::models::constants::REFERRAL_BONUS_IN_CENTS;
use crate::models::referrals::{ReferralOutcome, ReferralRejection};
use crate::models::transactions::{LedgerEntry, TransactionKind};

pub enum ReferralRequest {
    ApplyCode {
        external_key: String,
        code: String,
        response: oneshot::Sender<Result<ReferralOutcome, ServiceError>>,
    },
    Skip {
        external_key: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

impl From<ReferralRejection> for ServiceError {
    fn from(rejection: ReferralRejection) -> Self {
        let message = rejection.message().to_string();
        match rejection {
            ReferralRejection::AccountNotFound => ServiceError::NotFound(message),
            ReferralRejection::AlreadyDecided => ServiceError::AlreadyDecided(message),
            ReferralRejection::SelfReferral | ReferralRejection::UnknownCode => {
                ServiceError::InvalidInput(message)
            }
        }
    }
}

/// One-time bonus exchange between an inviter and an invitee.
#[derive(Clone)]
pub struct ReferralEngine {
    ledger: Ledger,
}

impl ReferralEngine {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Precondition failures come back as an unsuccessful outcome with nothing changed.
    /// Only storage failures are errors.
    pub async fn apply_code(
        &self,
        external_key: &str,
        code: &str,
    ) -> Result<ReferralOutcome, ServiceError> {
        let code = code.trim().to_uppercase();

        // Learn the inviter up front so both write sections can be taken in key order.
        let inviter_key = self
            .ledger
            .find_by_referral_code(&code)
            .await?
            .map(|inviter| inviter.external_key);
        let _guard = match &inviter_key {
            Some(inviter_key) => self.ledger.lock_pair(external_key, inviter_key).await,
            None => self.ledger.lock(external_key).await,
        };

        let mut tx = self.ledger.begin().await?;

        let mut invitee = match self.ledger.load_in(&mut tx, external_key).await {
            Ok(account) => account,
            Err(ServiceError::NotFound(_)) => {
                return Ok(self.refuse(external_key, ReferralRejection::AccountNotFound))
            }
            Err(e) => return Err(e),
        };
        if !invitee.referral.is_undecided() {
            return Ok(self.refuse(external_key, ReferralRejection::AlreadyDecided));
        }
        if code == invitee.referral_code {
            return Ok(self.refuse(external_key, ReferralRejection::SelfReferral));
        }
        let mut inviter = match self.ledger.find_by_referral_code_in(&mut tx, &code).await? {
            Some(inviter) if Some(&inviter.external_key) == inviter_key.as_ref() => inviter,
            _ => return Ok(self.refuse(external_key, ReferralRejection::UnknownCode)),
        };

        inviter.total_referrals_made += 1;
        self.ledger
            .apply_in(
                &mut tx,
                &mut inviter,
                LedgerEntry::credit(REFERRAL_BONUS_IN_CENTS),
                TransactionKind::ReferralBonus,
                &format!("Referral Bonus (Invited: {})", invitee.external_key),
            )
            .await?;

        invitee.referral = ReferralDecision::ReferredBy(code.clone());
        self.ledger
            .apply_in(
                &mut tx,
                &mut invitee,
                LedgerEntry::credit(REFERRAL_BONUS_IN_CENTS),
                TransactionKind::ReferralBonus,
                &format!("Referral Bonus (Inviter: {})", code),
            )
            .await?;

        tx.commit().await?;
        log::info!(
            "Referral {} applied: {} invited {}.",
            code,
            inviter.external_key,
            invitee.external_key
        );

        Ok(ReferralOutcome::applied())
    }

    /// Closes referral onboarding for an undecided account. Anything else is a no-op.
    pub async fn skip(&self, external_key: &str) -> Result<(), ServiceError> {
        let _guard = self.ledger.lock(external_key).await;
        let mut tx = self.ledger.begin().await?;

        let mut account = match self.ledger.load_in(&mut tx, external_key).await {
            Ok(account) => account,
            Err(ServiceError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        if !account.referral.is_undecided() {
            return Ok(());
        }

        account.referral = ReferralDecision::Skipped;
        self.ledger.save_in(&mut tx, &account).await?;

        tx.commit().await?;
        log::info!("Referral skipped by {}.", external_key);
        Ok(())
    }

    fn refuse(&self, external_key: &str, rejection: ReferralRejection) -> ReferralOutcome {
        log::warn!(
            "Referral for {} refused: {}",
            external_key,
            rejection.message()
        );
        ReferralOutcome::rejected(rejection)
    }
}

#[derive(Clone)]
pub struct ReferralRequestHandler {
    engine: ReferralEngine,
}

impl ReferralRequestHandler {
    pub fn new(engine: ReferralEngine) -> Self {
        ReferralRequestHandler { engine }
    }
}

#[async_trait]
impl RequestHandler<ReferralRequest> for ReferralRequestHandler {
    async fn handle_request(&self, request: ReferralRequest) {
        match request {
            ReferralRequest::ApplyCode {
                external_key,
                code,
                response,
            } => {
                let outcome = self.engine.apply_code(&external_key, &code).await;
                let _ = response.send(outcome);
            }
            ReferralRequest::Skip {
                external_key,
                response,
            } => {
                let result = self.engine.skip(&external_key).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct ReferralService;

impl ReferralService {
    pub fn new() -> Self {
        ReferralService {}
    }
}

#[async_trait]
impl Service<ReferralRequest, ReferralRequestHandler> for ReferralService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transactions::TransactionFilter;
    use crate::repositories::test_pool;
    use chrono::NaiveDate;
    use futures_util::future::join_all;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    async fn engine() -> ReferralEngine {
        let ledger = Ledger::new(test_pool().await);
        ledger.login_or_create("inviter", today()).await.unwrap();
        ledger.login_or_create("invitee", today()).await.unwrap();
        ReferralEngine::new(ledger)
    }

    async fn code_of(engine: &ReferralEngine, key: &str) -> String {
        engine.ledger.get_account(key).await.unwrap().referral_code
    }

    async fn total_balance(engine: &ReferralEngine) -> i64 {
        engine
            .ledger
            .list_accounts()
            .await
            .unwrap()
            .iter()
            .map(|a| a.balance_in_cents)
            .sum()
    }

    #[tokio::test]
    async fn test_apply_code_credits_both_sides() {
        let engine = engine().await;
        let code = code_of(&engine, "inviter").await;

        let outcome = engine.apply_code("invitee", &code).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.rejection, None);

        let inviter = engine.ledger.get_account("inviter").await.unwrap();
        let invitee = engine.ledger.get_account("invitee").await.unwrap();
        assert_eq!(inviter.balance_in_cents, REFERRAL_BONUS_IN_CENTS);
        assert_eq!(inviter.total_referrals_made, 1);
        assert_eq!(invitee.balance_in_cents, REFERRAL_BONUS_IN_CENTS);
        assert_eq!(invitee.referral, ReferralDecision::ReferredBy(code.clone()));

        let bonuses = engine
            .ledger
            .list_transactions(&TransactionFilter {
                kind: Some(TransactionKind::ReferralBonus),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(bonuses.len(), 2);
        assert!(bonuses
            .iter()
            .any(|t| t.account_key == "inviter" && t.details == "Referral Bonus (Invited: invitee)"));
        assert!(bonuses.iter().any(|t| t.account_key == "invitee"
            && t.details == format!("Referral Bonus (Inviter: {})", code)));
    }

    #[tokio::test]
    async fn test_code_is_normalized() {
        let engine = engine().await;
        let code = code_of(&engine, "inviter").await;

        let outcome = engine
            .apply_code("invitee", &format!("  {}  ", code.to_lowercase()))
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_second_application_is_refused() {
        let engine = engine().await;
        let code = code_of(&engine, "inviter").await;

        assert!(engine.apply_code("invitee", &code).await.unwrap().success);
        let again = engine.apply_code("invitee", &code).await.unwrap();
        assert!(!again.success);
        assert_eq!(again.rejection, Some(ReferralRejection::AlreadyDecided));
        assert_eq!(again.message, "Referral already processed");

        assert_eq!(total_balance(&engine).await, 2 * REFERRAL_BONUS_IN_CENTS);
    }

    #[tokio::test]
    async fn test_self_referral_changes_nothing() {
        let engine = engine().await;
        let own = code_of(&engine, "invitee").await;
        let before = engine.ledger.get_account("invitee").await.unwrap();

        let outcome = engine.apply_code("invitee", &own).await.unwrap();
        assert_eq!(outcome.rejection, Some(ReferralRejection::SelfReferral));
        assert_eq!(engine.ledger.get_account("invitee").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_code_and_unknown_account() {
        let engine = engine().await;

        let unknown = engine.apply_code("invitee", "ZZZZZZ").await.unwrap();
        assert_eq!(unknown.rejection, Some(ReferralRejection::UnknownCode));
        assert_eq!(unknown.message, "Invalid Referral Code");

        let code = code_of(&engine, "inviter").await;
        let missing = engine.apply_code("nobody", &code).await.unwrap();
        assert_eq!(missing.rejection, Some(ReferralRejection::AccountNotFound));
        assert_eq!(total_balance(&engine).await, 0);
    }

    #[tokio::test]
    async fn test_skip_closes_onboarding() {
        let engine = engine().await;
        engine.skip("invitee").await.unwrap();
        assert_eq!(
            engine.ledger.get_account("invitee").await.unwrap().referral,
            ReferralDecision::Skipped
        );

        let code = code_of(&engine, "inviter").await;
        let outcome = engine.apply_code("invitee", &code).await.unwrap();
        assert_eq!(outcome.rejection, Some(ReferralRejection::AlreadyDecided));

        // No-ops, never errors.
        engine.skip("invitee").await.unwrap();
        engine.skip("nobody").await.unwrap();
    }

    #[tokio::test]
    async fn test_skip_after_referral_keeps_referral() {
        let engine = engine().await;
        let code = code_of(&engine, "inviter").await;
        engine.apply_code("invitee", &code).await.unwrap();

        engine.skip("invitee").await.unwrap();
        assert_eq!(
            engine.ledger.get_account("invitee").await.unwrap().referral,
            ReferralDecision::ReferredBy(code)
        );
    }

    #[tokio::test]
    async fn test_crossed_referrals_do_not_deadlock() {
        let engine = engine().await;
        let inviter_code = code_of(&engine, "inviter").await;
        let invitee_code = code_of(&engine, "invitee").await;

        let attempts = (0..10).map(|i| {
            let engine = engine.clone();
            let (key, code) = if i % 2 == 0 {
                ("invitee", inviter_code.clone())
            } else {
                ("inviter", invitee_code.clone())
            };
            async move { engine.apply_code(key, &code).await }
        });

        let outcomes = tokio::time::timeout(std::time::Duration::from_secs(5), join_all(attempts))
            .await
            .expect("referrals deadlocked");
        let applied = outcomes
            .into_iter()
            .map(|o| o.unwrap())
            .filter(|o| o.success)
            .count();

        // Each account decides once, in either direction.
        assert_eq!(applied, 2);
        assert_eq!(total_balance(&engine).await, 4 * REFERRAL_BONUS_IN_CENTS);
    }

    #[test]
    fn test_rejections_map_to_error_classes() {
        assert!(matches!(
            ServiceError::from(ReferralRejection::AlreadyDecided),
            ServiceError::AlreadyDecided(_)
        ));
        assert!(matches!(
            ServiceError::from(ReferralRejection::SelfReferral),
            ServiceError::InvalidInput(_)
        ));
        assert!(matches!(
            ServiceError::from(ReferralRejection::AccountNotFound),
            ServiceError::NotFound(_)
        ));
    }
}
