//! Axum route handlers for the Generation API.

use std::convert::Infallible;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures_util::stream;
use serde_json::json;
use uuid::Uuid;

use crate::auth::Caller;
use crate::errors::AppError;
use crate::generation::cover_letter::{stream_cover_letter, CoverLetterEvent, CoverLetterQuery, CoverLetterStream};
use crate::generation::orchestrator::{
    create_generation, get_generation_status, CreateGenerationRequest, CreateGenerationResponse,
    GenerationStatusResponse,
};
use crate::state::AppState;

/// POST /api/v1/ai/generations
///
/// Runs on its own task: a client that disconnects mid-generation does not
/// leave the record in `running`.
pub async fn handle_create_generation(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<CreateGenerationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateGenerationResponse>), AppError> {
    let payload = payload
        .map(|Json(request)| request)
        .map_err(|e| AppError::InvalidInput(e.body_text()));

    let task = tokio::spawn(async move { create_generation(&state, &caller, payload).await });
    let response = task
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("generation task aborted: {e}")))??;

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/ai/generations/:id
pub async fn handle_get_generation(
    State(state): State<AppState>,
    caller: Caller,
    generation_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<GenerationStatusResponse>, AppError> {
    let Path(generation_id) =
        generation_id.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let status = get_generation_status(&state, &caller, generation_id).await?;
    Ok(Json(status))
}

/// GET /api/v1/ai/cover-letter/stream?generation_id=..&jd_text=..&pro=..
///
/// Server-sent events: `chunk` per piece of text, then one `done` or `error`.
pub async fn handle_stream_cover_letter(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<CoverLetterQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let query = query
        .map(|Query(q)| q)
        .map_err(|e| AppError::InvalidInput(e.body_text()));

    let CoverLetterStream { model, events } = stream_cover_letter(&state, &caller, query).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-model"),
        HeaderValue::from_str(&model).map_err(|e| AppError::Internal(e.into()))?,
    );

    let sse_events = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        Some((Ok::<_, Infallible>(to_sse_event(event)), events))
    });

    Ok((headers, Sse::new(sse_events).keep_alive(KeepAlive::default())))
}

fn to_sse_event(event: CoverLetterEvent) -> Event {
    match event {
        // SSE fields cannot carry bare carriage returns.
        CoverLetterEvent::Chunk(text) => Event::default().event("chunk").data(text.replace('\r', "")),
        CoverLetterEvent::Done { artifact_id } => Event::default()
            .event("done")
            .data(json!({ "artifact_id": artifact_id }).to_string()),
        CoverLetterEvent::Error(message) => Event::default()
            .event("error")
            .data(message.replace('\r', "")),
    }
}
