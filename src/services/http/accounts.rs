use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Local;
use serde_json::json;

use super::{dispatch, AppState, Reply};
use crate::models::accounts::{AccountPatch, LoginRequest};
use crate::models::transactions::AdjustmentRequest;
use crate::services::accounts::AccountRequest;

pub(crate) async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Reply {
    let result = dispatch("login", &state.account_channel, |response| {
        AccountRequest::Login {
            external_key: req.external_key,
            today: Local::now().date_naive(),
            response,
        }
    })
    .await;

    match result {
        Ok(account) => (StatusCode::OK, Json(json!(account))),
        Err(reply) => reply,
    }
}

pub(crate) async fn list_accounts(State(state): State<AppState>) -> Reply {
    let result = dispatch("list_accounts", &state.account_channel, |response| {
        AccountRequest::ListAccounts { response }
    })
    .await;

    match result {
        Ok(accounts) => (StatusCode::OK, Json(json!(accounts))),
        Err(reply) => reply,
    }
}

pub(crate) async fn get_account(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
) -> Reply {
    let result = dispatch("get_account", &state.account_channel, |response| {
        AccountRequest::GetAccount {
            external_key,
            response,
        }
    })
    .await;

    match result {
        Ok(account) => (StatusCode::OK, Json(json!(account))),
        Err(reply) => reply,
    }
}

pub(crate) async fn patch_account(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
    Json(patch): Json<AccountPatch>,
) -> Reply {
    let result = dispatch("patch_account", &state.account_channel, |response| {
        AccountRequest::Patch {
            external_key,
            patch,
            response,
        }
    })
    .await;

    match result {
        Ok(account) => (StatusCode::OK, Json(json!(account))),
        Err(reply) => reply,
    }
}

pub(crate) async fn adjust_balance(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
    Json(req): Json<AdjustmentRequest>,
) -> Reply {
    let result = dispatch("adjust_balance", &state.account_channel, |response| {
        AccountRequest::AdjustBalance {
            external_key,
            amount_in_cents: req.amount_in_cents,
            kind: req.kind,
            note: req.note,
            response,
        }
    })
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
