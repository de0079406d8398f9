use crate::error::SubmitError;
use crate::robot::models::{Command, CommandRequest};
use crate::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cache.views(state.config.telemetry_stale_after()))
}

pub async fn submit_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CommandRequest>,
) -> impl IntoResponse {
    let api_key = headers.get("X-Api-Key").and_then(|v| v.to_str().ok());

    if api_key != Some(&state.config.adapter_api_key) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "status": "error",
                "message": "Invalid API Key"
            })),
        )
            .into_response();
    }

    let command = Command::parse(&payload.action, payload.pose);
    let token = command.token().to_string();

    match state.commands.submit(command) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": "success",
                "command": token
            })),
        )
            .into_response(),
        Err(SubmitError::Pending(_)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "error",
                "message": "A command is already pending, retry later"
            })),
        )
            .into_response(),
        Err(SubmitError::Stopped(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "error",
                "message": "Command dispatcher is not running"
            })),
        )
            .into_response(),
    }
}

pub async fn check_robot_connection(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let url = state.client.base_url();

    match state.client.is_reachable().await {
        Ok(()) => Json(serde_json::json!({
            "status": "success",
            "connected": true,
            "url": url
        })),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Robot connectivity check failed");
            Json(serde_json::json!({
                "status": "error",
                "connected": false,
                "message": format!("Failed to reach robot: {e}"),
                "url": url
            }))
        }
    }
}
