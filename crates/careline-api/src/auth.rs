//! Caller identity.
//!
//! Requests arrive through an auth gateway that has already verified the
//! caller and forwards the account as `X-Account-Id` / `X-Account-Role`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use careline_core::{RequestContext, RoleType};

use crate::error::ApiError;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_ROLE_HEADER: &str = "x-account-role";

/// Extractor for the acting account; rejects with 401.
#[derive(Debug, Clone)]
pub struct Identity(pub RequestContext);

impl Identity {
    pub fn account_id(&self) -> i64 {
        self.0.account_id
    }

    pub fn role(&self) -> RoleType {
        self.0.role
    }

    pub fn into_context(self) -> RequestContext {
        self.0
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id = header(parts, ACCOUNT_ID_HEADER)?
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ApiError::Unauthorized("invalid account id".into()))?;
        let role = header(parts, ACCOUNT_ROLE_HEADER)?
            .parse::<RoleType>()
            .map_err(|_| ApiError::Unauthorized("invalid account role".into()))?;

        Ok(Identity(RequestContext::new(account_id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", name)))
}

/// Account id from the identity headers, without validation.
pub fn account_id_hint(headers: &axum::http::HeaderMap) -> Option<i64> {
    headers
        .get(ACCOUNT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
