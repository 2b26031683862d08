use axum::{Json, extract::State};
use std::sync::Arc;

use crate::error::Result;
use crate::extract::{AppJson, ClientId};
use crate::metrics::REQUEST_TOTAL;
use crate::models::{ApiResponse, ContactForm};
use crate::state::AppState;

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    AppJson(form): AppJson<ContactForm>,
) -> Result<Json<ApiResponse<()>>> {
    REQUEST_TOTAL.inc();

    state.contact.submit(&client, &form).await?;
    Ok(Json(ApiResponse::success(
        None,
        Some("Message sent successfully".to_string()),
    )))
}
