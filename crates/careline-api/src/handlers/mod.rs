//! HTTP handlers for careline-api.

pub mod app_events;
pub mod case_messages;

use axum::response::IntoResponse;
use axum::Json;

pub use app_events::record_app_event;
pub use case_messages::{assign_case, list_messages, mark_read, post_message, unread_count};

// =============================================================================
// HEALTH CHECK
// =============================================================================

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
