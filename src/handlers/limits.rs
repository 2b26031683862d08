use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::extract::ClientId;
use crate::models::{ApiResponse, LimitStatus};
use crate::rate_limit::{COMPLETION_KEY, CONTACT_FORM_KEY, client_key};
use crate::state::AppState;

// Remaining quota for the calling visitor, lets the site warn before a rejection
pub async fn limits_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<LimitStatus>>> {
    if key != COMPLETION_KEY && key != CONTACT_FORM_KEY {
        return Err(AppError::BadRequest(format!("Unknown limit: {}", key)));
    }

    let limiter_key = client_key(&key, &client);
    let status = LimitStatus {
        remaining: state.limiter.remaining_requests(&limiter_key),
        reset_ms: state.limiter.reset_time(&limiter_key).as_millis() as u64,
        key,
    };
    Ok(Json(ApiResponse::success(Some(status), None)))
}
