use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{dispatch, AppState, Reply};
use crate::models::transactions::{
    AdjudicationRequest, DepositRequest, FailureRequest, TransactionFilter, WithdrawalRequest,
};
use crate::services::transactions::TransactionServiceRequest;

pub(crate) async fn submit_deposit(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
    Json(req): Json<DepositRequest>,
) -> Reply {
    let result = dispatch("submit_deposit", &state.transaction_channel, |response| {
        TransactionServiceRequest::SubmitDeposit {
            external_key,
            amount_in_cents: req.amount_in_cents,
            reference: req.reference,
            response,
        }
    })
    .await;

    match result {
        Ok(transaction) => (StatusCode::CREATED, Json(json!(transaction))),
        Err(reply) => reply,
    }
}

pub(crate) async fn submit_withdrawal(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
    Json(req): Json<WithdrawalRequest>,
) -> Reply {
    let result = dispatch(
        "submit_withdrawal",
        &state.transaction_channel,
        |response| TransactionServiceRequest::SubmitWithdrawal {
            external_key,
            amount_in_cents: req.amount_in_cents,
            destination: req.destination,
            response,
        },
    )
    .await;

    match result {
        Ok((account, transaction)) => (
            StatusCode::CREATED,
            Json(json!({
                "account": account,
                "transaction": transaction
            })),
        ),
        Err(reply) => reply,
    }
}

pub(crate) async fn list_transactions(
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> Reply {
    let result = dispatch(
        "list_transactions",
        &state.transaction_channel,
        |response| TransactionServiceRequest::ListTransactions { filter, response },
    )
    .await;

    match result {
        Ok(transactions) => (StatusCode::OK, Json(json!(transactions))),
        Err(reply) => reply,
    }
}

pub(crate) async fn adjudicate(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(req): Json<AdjudicationRequest>,
) -> Reply {
    let result = dispatch("adjudicate", &state.transaction_channel, |response| {
        TransactionServiceRequest::Adjudicate {
            transaction_id,
            decision: req.decision,
            note: req.note,
            response,
        }
    })
    .await;

    match result {
        Ok(transaction) => (StatusCode::OK, Json(json!(transaction))),
        Err(reply) => reply,
    }
}

pub(crate) async fn fail(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(req): Json<FailureRequest>,
) -> Reply {
    let result = dispatch("fail", &state.transaction_channel, |response| {
        TransactionServiceRequest::Fail {
            transaction_id,
            note: req.note,
            response,
        }
    })
    .await;

    match result {
        Ok(transaction) => (StatusCode::OK, Json(json!(transaction))),
        Err(reply) => reply,
    }
}
