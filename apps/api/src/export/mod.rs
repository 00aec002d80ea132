//! PDF export of stored artifacts.

pub mod handlers;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::generation::{ArtifactType, GeneratedArtifact};
use crate::render::{RenderDocument, RenderError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub artifact_id: Uuid,
    pub kind: ArtifactType,
}

#[derive(Debug)]
pub struct PdfExport {
    pub filename: &'static str,
    pub bytes: Vec<u8>,
}

fn filename(kind: ArtifactType) -> &'static str {
    match kind {
        ArtifactType::Resume => "resume.pdf",
        ArtifactType::CoverLetter => "cover-letter.pdf",
    }
}

/// Builds the block document for an artifact according to its type.
pub fn document_for(artifact: &GeneratedArtifact) -> Result<RenderDocument, RenderError> {
    match artifact.artifact_type {
        ArtifactType::Resume => RenderDocument::from_resume(&artifact.content),
        ArtifactType::CoverLetter => {
            let markdown = artifact.markdown().ok_or_else(|| {
                RenderError::Content("cover letter content is not markdown text".to_string())
            })?;
            Ok(RenderDocument::from_markdown("Cover Letter", markdown))
        }
    }
}

/// Fetches an owned artifact of the declared kind and renders it.
pub async fn export_pdf(
    state: &AppState,
    caller: &Caller,
    request: ExportRequest,
) -> Result<PdfExport, AppError> {
    let artifact = state
        .store
        .find_artifact(caller.user_id, request.artifact_id)
        .await?
        .filter(|a| a.artifact_type == request.kind)
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    let document = document_for(&artifact).map_err(|e| AppError::Render(e.to_string()))?;
    let renderer = state.renderer.clone();
    let bytes = tokio::task::spawn_blocking(move || renderer.render(&document))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("render task failed: {e}")))?
        .map_err(|e| AppError::Render(e.to_string()))?;

    info!(
        "Exported {} {} ({} bytes)",
        artifact.artifact_type.as_str(),
        artifact.id,
        bytes.len()
    );

    Ok(PdfExport {
        filename: filename(request.kind),
        bytes,
    })
}
