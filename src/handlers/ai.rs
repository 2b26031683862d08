use axum::{Json, extract::State};
use std::sync::Arc;

use crate::error::Result;
use crate::extract::{AppJson, ClientId};
use crate::metrics::REQUEST_TOTAL;
use crate::models::{
    AnalyzeRequest, ApiResponse, ChatMessage, ChatRequest, GeneratedImage, ImageRequest,
};
use crate::state::AppState;

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    AppJson(payload): AppJson<ChatRequest>,
) -> Result<Json<ApiResponse<ChatMessage>>> {
    REQUEST_TOTAL.inc();

    let reply = state.completion()?.chat(&client, &payload.messages).await?;
    Ok(Json(ApiResponse::success(Some(reply), None)))
}

pub async fn image_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    AppJson(payload): AppJson<ImageRequest>,
) -> Result<Json<ApiResponse<GeneratedImage>>> {
    REQUEST_TOTAL.inc();

    let image = state
        .completion()?
        .generate_image(&client, &payload.prompt)
        .await?;
    Ok(Json(ApiResponse::success(Some(image), None)))
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    AppJson(payload): AppJson<AnalyzeRequest>,
) -> Result<Json<ApiResponse<ChatMessage>>> {
    REQUEST_TOTAL.inc();

    let insights = state
        .completion()?
        .analyze_text(&client, &payload.text)
        .await?;
    Ok(Json(ApiResponse::success(Some(insights), None)))
}
