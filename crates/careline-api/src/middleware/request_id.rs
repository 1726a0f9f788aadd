use axum::http::Request;
use tower_http::request_id::{MakeRequestId, RequestId};

/// Stamps requests without an `x-request-id` with a UUIDv7.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = careline_core::new_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}
