//! # careline-api
//!
//! HTTP surface for careline case messaging.
//!
//! Identity is taken from headers set by the upstream auth gateway
//! (`X-Account-Id`, `X-Account-Role`); see [`auth`].

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod urls;

use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;
pub use urls::PassthroughMediaUrlSigner;

use handlers::{
    assign_case, health_check, list_messages, mark_read, post_message, record_app_event,
    unread_count,
};
use middleware::{record_request, MakeRequestUuidV7};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Case messaging
        .route("/v1/case/messages", post(post_message).get(list_messages))
        .route("/v1/case/assign", post(assign_case))
        .route("/v1/case/messages/read", post(mark_read))
        .route("/v1/case/messages/unread_count", get(unread_count))
        // Client analytics and triggers
        .route("/v1/app_event", post(record_app_event))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            record_request,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state)
}
