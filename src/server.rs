use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

use crate::event::EventEnvelope;
use crate::moderator::Moderator;

pub fn router(moderator: Arc<Moderator>) -> Router {
    Router::new()
        .route("/slack/events", post(handle_events))
        .route("/health", get(health))
        .with_state(moderator)
}

/// Serve the Events API webhook until the process is stopped.
pub async fn serve(bind: &str, moderator: Arc<Moderator>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;
    info!("Slack Events webhook listening on {}", bind);

    axum::serve(listener, router(moderator))
        .await
        .context("Server error")
}

async fn health() -> &'static str {
    "ok"
}

async fn handle_events(
    State(moderator): State<Arc<Moderator>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let envelope = EventEnvelope::from_value(body);
    match moderator.handle(&envelope).await {
        Ok(outcome) => match outcome.response() {
            Some(payload) => Json(payload).into_response(),
            // Rejected deliveries are acknowledged with an empty object.
            None => Json(serde_json::json!({})).into_response(),
        },
        Err(e) => {
            error!(service = ?e.service(), "Failed to moderate event: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
