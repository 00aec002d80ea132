use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::rate_limit::RateLimitScope;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Every variant maps to its own status code and machine-readable code so
/// callers can tell "try again later" from "fix your input" from
/// "something went wrong, check status".
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded ({scope})")]
    RateLimited {
        scope: RateLimitScope,
        retry_after_secs: u64,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Schema invalid: {message}")]
    SchemaInvalid { message: String, errors: Vec<String> },

    #[error("Generation {generation_id} failed: {message}")]
    GenerationFailed { generation_id: Uuid, message: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable category for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::SchemaInvalid { .. } => "SCHEMA_INVALID",
            AppError::GenerationFailed { .. } => "GENERATION_FAILED",
            AppError::Store(_) => "STORAGE_ERROR",
            AppError::Render(_) => "RENDER_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SchemaInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::GenerationFailed { .. }
            | AppError::Store(_)
            | AppError::Render(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details): (String, Option<Value>) = match &self {
            AppError::Unauthorized => ("Authentication required".to_string(), None),
            AppError::RateLimited {
                scope,
                retry_after_secs,
            } => (
                format!("Rate limit exceeded ({scope})"),
                Some(json!({ "scope": scope, "retry_after": retry_after_secs })),
            ),
            AppError::InvalidInput(msg) | AppError::NotFound(msg) => (msg.clone(), None),
            AppError::SchemaInvalid { message, errors } => {
                (message.clone(), Some(json!({ "errors": errors })))
            }
            AppError::GenerationFailed {
                generation_id,
                message,
            } => {
                tracing::warn!("Generation {generation_id} failed: {message}");
                (
                    message.clone(),
                    Some(json!({ "generation_id": generation_id, "status": "failed" })),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Storage error: {e}");
                ("A storage error occurred".to_string(), None)
            }
            AppError::Render(msg) => {
                tracing::error!("Render error: {msg}");
                ("The document could not be rendered".to_string(), None)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                ("An internal server error occurred".to_string(), None)
            }
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();

        if let AppError::RateLimited {
            retry_after_secs, ..
        } = self
        {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs),
            );
        }

        response
    }
}
