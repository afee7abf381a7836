use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{dispatch, error_status, AppState, Reply};
use crate::models::referrals::ApplyReferralRequest;
use crate::services::referrals::ReferralRequest;
use crate::services::ServiceError;

pub(crate) async fn apply_code(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
    Json(req): Json<ApplyReferralRequest>,
) -> Reply {
    let result = dispatch("apply_code", &state.referral_channel, |response| {
        ReferralRequest::ApplyCode {
            external_key,
            code: req.code,
            response,
        }
    })
    .await;

    match result {
        Ok(outcome) => {
            // Refusals keep the outcome body so callers can show its message.
            let status = match outcome.rejection {
                Some(rejection) => error_status(&ServiceError::from(rejection)),
                None => StatusCode::OK,
            };
            (status, Json(json!(outcome)))
        }
        Err(reply) => reply,
    }
}

pub(crate) async fn skip(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
) -> Reply {
    let result = dispatch("skip_referral", &state.referral_channel, |response| {
        ReferralRequest::Skip {
            external_key,
            response,
        }
    })
    .await;

    match result {
        Ok(()) => (StatusCode::OK, Json(json!({ "skipped": true }))),
        Err(reply) => reply,
    }
}
