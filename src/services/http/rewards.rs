use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Local;
use serde_json::json;

use super::{dispatch, AppState, Reply};
use crate::services::rewards::SpinRequest;

pub(crate) async fn spin(
    State(state): State<AppState>,
    Path(external_key): Path<String>,
) -> Reply {
    let result = dispatch("spin", &state.reward_channel, |response| SpinRequest::Spin {
        external_key,
        today: Local::now().date_naive(),
        response,
    })
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))),
        Err(reply) => reply,
    }
}
