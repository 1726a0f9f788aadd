//! Per-request analytics.
//!
//! Every handled request yields one [`WebRequestEvent`], published on the
//! bus without waiting for it to be stored.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use careline_core::{defaults, DomainEvent, WebRequestEvent};

use crate::auth::account_id_hint;
use crate::state::AppState;

pub async fn record_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let timestamp = Utc::now();

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let url = req.uri().to_string();
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| careline_core::new_v7().to_string());
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let account_id = account_id_hint(req.headers());
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    let response = next.run(req).await;

    let event = WebRequestEvent {
        service: defaults::SERVICE_NAME.to_string(),
        path,
        timestamp,
        request_id,
        status_code: i32::from(response.status().as_u16()),
        method,
        url,
        resp_time_us: started.elapsed().as_micros() as i64,
        remote_addr,
        user_agent,
        account_id,
    };
    state
        .bus
        .publish_async(DomainEvent::HttpRequestCompleted(event))
        .await;

    response
}
