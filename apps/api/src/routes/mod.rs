pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::export::handlers as export;
use crate::generation::handlers as generation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation API
        .route(
            "/api/v1/ai/generations",
            post(generation::handle_create_generation),
        )
        .route(
            "/api/v1/ai/generations/:id",
            get(generation::handle_get_generation),
        )
        .route(
            "/api/v1/ai/cover-letter/stream",
            get(generation::handle_stream_cover_letter),
        )
        // Export API
        .route("/api/v1/ai/exports/pdf", post(export::handle_export_pdf))
        .with_state(state)
}
