use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    analyze_handler, chat_handler, contact_handler, health_handler, image_handler,
    limits_handler, metrics_handler,
};
use crate::security::{SecurityHeaders, cors_layer, security_headers};
use crate::state::AppState;

pub fn router(
    state: Arc<AppState>,
    security: Arc<SecurityHeaders>,
    allowed_origins: &[String],
) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/image", post(image_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/contact", post(contact_handler))
        .route("/api/limits/{key}", get(limits_handler))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(security, security_headers))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
