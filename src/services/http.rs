use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::{
    accounts::AccountRequest, referrals::ReferralRequest, rewards::SpinRequest,
    transactions::TransactionServiceRequest, ServiceError,
};

mod accounts;
mod referrals;
mod rewards;
mod transactions;

pub(crate) type Reply = (StatusCode, Json<Value>);

pub struct Channels {
    pub account_channel: mpsc::Sender<AccountRequest>,
    pub transaction_channel: mpsc::Sender<TransactionServiceRequest>,
    pub referral_channel: mpsc::Sender<ReferralRequest>,
    pub reward_channel: mpsc::Sender<SpinRequest>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    account_channel: mpsc::Sender<AccountRequest>,
    transaction_channel: mpsc::Sender<TransactionServiceRequest>,
    referral_channel: mpsc::Sender<ReferralRequest>,
    reward_channel: mpsc::Sender<SpinRequest>,
}

pub(crate) fn error_status(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ServiceError::AlreadyDecided(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::AdvisoryRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Database(_)
        | ServiceError::Repository(_, _)
        | ServiceError::Communication(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_reply(error: ServiceError) -> Reply {
    let status = error_status(&error);
    let label = match &error {
        ServiceError::NotFound(_) => "Not found",
        ServiceError::InvalidInput(_) => "Invalid input",
        ServiceError::AlreadyDecided(_) => "Already decided",
        ServiceError::AdvisoryRejected(_) => "Advisory rejected",
        ServiceError::Conflict(_) => "Conflict",
        _ => "Internal server error",
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("{}", error);
    }

    (
        status,
        Json(json!({
            "error": label,
            "details": error.to_string()
        })),
    )
}

/// Sends one request to a service and waits for its answer.
pub(crate) async fn dispatch<R, T, F>(
    route: &str,
    channel: &mpsc::Sender<R>,
    make_request: F,
) -> Result<T, Reply>
where
    R: Send + 'static,
    T: Send,
    F: FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
{
    let (response_tx, response_rx) = oneshot::channel();

    if let Err(e) = channel.send(make_request(response_tx)).await {
        return Err(error_reply(ServiceError::Communication(
            route.to_string(),
            e.to_string(),
        )));
    }

    match response_rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(service_error)) => Err(error_reply(service_error)),
        Err(e) => Err(error_reply(ServiceError::Communication(
            route.to_string(),
            e.to_string(),
        ))),
    }
}

fn router(channels: Channels) -> Router {
    let app_state = AppState {
        account_channel: channels.account_channel,
        transaction_channel: channels.transaction_channel,
        referral_channel: channels.referral_channel,
        reward_channel: channels.reward_channel,
    };

    Router::new()
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/login", post(accounts::login))
        .route(
            "/accounts/{key}",
            get(accounts::get_account).patch(accounts::patch_account),
        )
        .route("/accounts/{key}/adjustments", post(accounts::adjust_balance))
        .route("/accounts/{key}/deposits", post(transactions::submit_deposit))
        .route(
            "/accounts/{key}/withdrawals",
            post(transactions::submit_withdrawal),
        )
        .route("/accounts/{key}/referral", post(referrals::apply_code))
        .route("/accounts/{key}/referral/skip", post(referrals::skip))
        .route("/accounts/{key}/spins", post(rewards::spin))
        .route("/transactions", get(transactions::list_transactions))
        .route(
            "/transactions/{id}/adjudication",
            post(transactions::adjudicate),
        )
        .route("/transactions/{id}/failure", post(transactions::fail))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(listen: &str, channels: Channels) -> Result<(), anyhow::Error> {
    let app = router(channels);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
