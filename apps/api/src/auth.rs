//! Caller identity and origin resolution.
//!
//! Sessions are owned by an upstream gateway; this service only reads the
//! identity the gateway has already resolved.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{HeaderMap, HeaderName, InvalidHeaderName};
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

/// Resolves the caller identity for a request, or `None` when there is none.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, parts: &Parts) -> Option<Uuid>;
}

/// Reads a UUID from a header set by the trusted session gateway.
pub struct TrustedHeaderIdentity {
    header: HeaderName,
}

impl TrustedHeaderIdentity {
    pub fn new(header: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())?,
        })
    }
}

#[async_trait]
impl IdentityProvider for TrustedHeaderIdentity {
    async fn resolve(&self, parts: &Parts) -> Option<Uuid> {
        parts
            .headers
            .get(&self.header)?
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
    }
}

/// Authenticated caller plus the origin address used for rate limiting.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub origin: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let user_id = state
            .identity
            .resolve(parts)
            .await
            .ok_or(AppError::Unauthorized)?;

        Ok(Caller {
            user_id,
            origin: client_origin(&parts.headers),
        })
    }
}

/// First `x-forwarded-for` hop, else `x-real-ip`.
pub fn client_origin(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}
