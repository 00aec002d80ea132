use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::Caller;
use crate::errors::AppError;
use crate::export::{export_pdf, ExportRequest};
use crate::render::pdf::PDF_CONTENT_TYPE;
use crate::state::AppState;

/// POST /api/v1/ai/exports/pdf
///
/// Body: `{ "artifact_id": "...", "kind": "resume" | "cover_letter" }`.
pub async fn handle_export_pdf(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let export = export_pdf(&state, &caller, request).await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        export.filename
    ))
    .map_err(|e| AppError::Internal(e.into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE)),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response())
}
