use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::repositories::advisory::{HttpRiskAdvisor, RiskAdvisor, UnconfiguredRiskAdvisor};
use crate::settings::Settings;

pub mod accounts;
pub mod approvals;
pub mod http;
pub mod ledger;
pub mod referrals;
pub mod rewards;
pub mod transactions;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Already decided: {0}")]
    AlreadyDecided(String),
    #[error("Advisory rejected: {0}")]
    AdvisoryRejected(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    pub(crate) fn repository(component: &'static str) -> impl Fn(anyhow::Error) -> ServiceError {
        move |e| ServiceError::Repository(component.to_string(), e.to_string())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Database(e.to_string())
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// The core components wired over one pool. Cheap to clone.
#[derive(Clone)]
pub struct Core {
    pub ledger: ledger::Ledger,
    pub approvals: approvals::ApprovalWorkflow,
    pub referrals: referrals::ReferralEngine,
    pub rewards: rewards::SpinEngine,
}

impl Core {
    pub fn new(
        pool: SqlitePool,
        advisor: Arc<dyn RiskAdvisor>,
        advisory_timeout: Duration,
        deposit_method: String,
        wheel: rewards::selector::Wheel,
    ) -> Self {
        let ledger = ledger::Ledger::new(pool);
        let approvals = approvals::ApprovalWorkflow::new(
            ledger.clone(),
            advisor,
            advisory_timeout,
            deposit_method,
        );
        let referrals = referrals::ReferralEngine::new(ledger.clone());
        let rewards = rewards::SpinEngine::new(ledger.clone(), wheel);

        Self {
            ledger,
            approvals,
            referrals,
            rewards,
        }
    }

    pub fn from_settings(pool: SqlitePool, settings: &Settings) -> Result<Self, anyhow::Error> {
        let advisor: Arc<dyn RiskAdvisor> = match &settings.advisory.url {
            Some(url) => Arc::new(HttpRiskAdvisor::new(
                url.clone(),
                settings.advisory.api_key.clone(),
            )),
            None => {
                log::warn!("No advisory endpoint configured, deposits go to manual review.");
                Arc::new(UnconfiguredRiskAdvisor)
            }
        };

        let wheel = rewards::selector::Wheel::new(settings.rewards.segments.clone())?;

        Ok(Self::new(
            pool,
            advisor,
            Duration::from_millis(settings.advisory.timeout_ms),
            settings.advisory.method.clone(),
            wheel,
        ))
    }
}

/// Spawns one actor per caller-facing area and returns the channels that feed them.
pub fn spawn_services(core: Core) -> http::Channels {
    let (account_tx, mut account_rx) = mpsc::channel(512);
    let (transaction_tx, mut transaction_rx) = mpsc::channel(512);
    let (referral_tx, mut referral_rx) = mpsc::channel(512);
    let (reward_tx, mut reward_rx) = mpsc::channel(512);

    let mut account_service = accounts::AccountService::new();
    let mut transaction_service = transactions::TransactionService::new();
    let mut referral_service = referrals::ReferralService::new();
    let mut reward_service = rewards::RewardService::new();

    log::info!("Starting account service.");
    let account_ledger = core.ledger.clone();
    tokio::spawn(async move {
        account_service
            .run(
                accounts::AccountRequestHandler::new(account_ledger),
                &mut account_rx,
            )
            .await;
    });

    log::info!("Starting transaction service.");
    let transaction_workflow = core.approvals.clone();
    tokio::spawn(async move {
        transaction_service
            .run(
                transactions::TransactionRequestHandler::new(transaction_workflow),
                &mut transaction_rx,
            )
            .await;
    });

    log::info!("Starting referral service.");
    let referral_engine = core.referrals.clone();
    tokio::spawn(async move {
        referral_service
            .run(
                referrals::ReferralRequestHandler::new(referral_engine),
                &mut referral_rx,
            )
            .await;
    });

    log::info!("Starting reward service.");
    let spin_engine = core.rewards.clone();
    tokio::spawn(async move {
        reward_service
            .run(rewards::RewardRequestHandler::new(spin_engine), &mut reward_rx)
            .await;
    });

    http::Channels {
        account_channel: account_tx,
        transaction_channel: transaction_tx,
        referral_channel: referral_tx,
        reward_channel: reward_tx,
    }
}

pub async fn start_services(core: Core, settings: Settings) -> Result<(), anyhow::Error> {
    let channels = spawn_services(core);

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.http.listen, channels).await
}
