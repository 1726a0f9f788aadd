//! Client app event ingestion.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use careline_core::{AppEvent, DomainEvent};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AppEventRequest {
    pub resource: String,
    #[serde(default)]
    pub resource_id: i64,
    pub action: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Record an app interaction and hand it to the bus.
///
/// POST /v1/app_event
pub async fn record_app_event(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<AppEventRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.resource.trim().is_empty() || req.action.trim().is_empty() {
        return Err(ApiError::BadRequest("resource and action required".into()));
    }

    let event = AppEvent {
        account_id: identity.account_id(),
        role: identity.role(),
        resource: req.resource,
        resource_id: req.resource_id,
        action: req.action,
        session_id: req.session_id,
        device_id: req.device_id,
        timestamp: Utc::now(),
    };
    debug!(
        subsystem = "api",
        resource = %event.resource,
        resource_id = event.resource_id,
        action = %event.action,
        "App event received"
    );
    state.bus.publish_async(DomainEvent::App(event)).await;

    Ok(Json(json!({ "success": true })))
}
