//! Streaming cover-letter generation.
//!
//! Chunks are forwarded as they arrive. A pump task owns the generator stream,
//! so a caller that goes away only stops delivery: the pump keeps draining and
//! persists the assembled letter once, after the last chunk. The letter is only
//! attached to a generation that is `succeeded` at that moment; otherwise it is
//! delivered but not stored.

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Caller;
use crate::errors::AppError;
use crate::generation::orchestrator::{enforce_rate_limit, required_text};
use crate::generation::prompts::{build_cover_letter_prompt, PromptOptions, PROMPT_VERSION};
use crate::llm_client::TextStream;
use crate::models::generation::{ArtifactFormat, ArtifactType, GenerationStatus, NewArtifact};
use crate::state::AppState;
use crate::store::{Store, StoreError};

const CHANNEL_CAPACITY: usize = 32;
const MAX_HIGHLIGHTS: usize = 12;

#[derive(Debug, Deserialize)]
pub struct CoverLetterQuery {
    pub generation_id: Uuid,
    pub jd_text: Option<String>,
    #[serde(default)]
    pub pro: bool,
    pub tone: Option<String>,
}

/// What the caller sees, in order: zero or more chunks, then one terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverLetterEvent {
    Chunk(String),
    /// `artifact_id` is `None` when nothing was persisted.
    Done { artifact_id: Option<Uuid> },
    Error(String),
}

pub struct CoverLetterStream {
    pub model: String,
    pub events: mpsc::Receiver<CoverLetterEvent>,
}

pub async fn stream_cover_letter(
    state: &AppState,
    caller: &Caller,
    query: Result<CoverLetterQuery, AppError>,
) -> Result<CoverLetterStream, AppError> {
    enforce_rate_limit(state, caller).await?;

    let query = query?;
    let jd_text = required_text(query.jd_text.as_deref(), "jd_text")?;

    let generation = state
        .store
        .find_generation(caller.user_id, query.generation_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Generation not found".to_string()))?;

    if generation.status == GenerationStatus::Failed {
        return Err(AppError::InvalidInput(format!(
            "Generation {} failed and cannot seed a cover letter",
            generation.id
        )));
    }

    let existing = state
        .store
        .find_artifact_for_generation(caller.user_id, generation.id, ArtifactType::CoverLetter)
        .await?;
    if existing.is_some() {
        return Err(AppError::InvalidInput(format!(
            "Generation {} already has a cover letter",
            generation.id
        )));
    }

    let highlights = state
        .store
        .find_artifact_for_generation(caller.user_id, generation.id, ArtifactType::Resume)
        .await?
        .and_then(|artifact| resume_highlights(&artifact.content));

    let options = PromptOptions {
        tone: query.tone.as_deref(),
        seniority: None,
    };
    let prompt = build_cover_letter_prompt(jd_text, highlights.as_deref(), &options);

    let generator = state.generators.for_tier(query.pro);
    let deadline = Instant::now() + state.config.generation_timeout;
    let chunks = match tokio::time::timeout_at(deadline, generator.generate_stream(&prompt)).await
    {
        Ok(Ok(chunks)) => chunks,
        Ok(Err(e)) => {
            return Err(AppError::GenerationFailed {
                generation_id: generation.id,
                message: format!("cover letter stream could not be opened: {e}"),
            })
        }
        Err(_) => {
            return Err(AppError::GenerationFailed {
                generation_id: generation.id,
                message: "cover letter stream timed out before opening".to_string(),
            })
        }
    };

    info!(
        "Streaming cover letter for generation {} (model: {})",
        generation.id,
        generator.model()
    );

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let target = NewArtifact {
        owner_id: caller.user_id,
        generation_id: generation.id,
        artifact_type: ArtifactType::CoverLetter,
        format: ArtifactFormat::Markdown,
        content: Value::Null,
        version: PROMPT_VERSION.to_string(),
    };
    tokio::spawn(pump(state.store.clone(), chunks, tx, target, deadline));

    Ok(CoverLetterStream {
        model: generator.model().to_string(),
        events: rx,
    })
}

/// Drains the generator stream, forwarding while the caller listens, then
/// persists the full text exactly once.
async fn pump(
    store: std::sync::Arc<dyn Store>,
    mut chunks: TextStream,
    tx: mpsc::Sender<CoverLetterEvent>,
    mut target: NewArtifact,
    deadline: Instant,
) {
    let generation_id = target.generation_id;
    let mut assembled = String::new();
    let mut listening = true;

    let failure = loop {
        match tokio::time::timeout_at(deadline, chunks.next()).await {
            Ok(Some(Ok(chunk))) => {
                assembled.push_str(&chunk);
                if listening && tx.send(CoverLetterEvent::Chunk(chunk)).await.is_err() {
                    debug!("Cover letter client for generation {generation_id} disconnected");
                    listening = false;
                }
            }
            Ok(Some(Err(e))) => break Some(format!("generator stream failed: {e}")),
            Ok(None) => break None,
            Err(_) => break Some("generator stream timed out".to_string()),
        }
    };

    if let Some(message) = failure {
        warn!("Cover letter for generation {generation_id} not persisted: {message}");
        let _ = tx.send(CoverLetterEvent::Error(message)).await;
        return;
    }

    let artifact_id = if assembled.trim().is_empty() {
        warn!("Cover letter for generation {generation_id} was empty; nothing persisted");
        None
    } else {
        target.content = Value::String(assembled);
        match store.insert_artifact(target).await {
            Ok(artifact) => {
                info!(
                    "Cover letter {} persisted for generation {generation_id}",
                    artifact.id
                );
                Some(artifact.id)
            }
            Err(StoreError::Conflict(reason)) => {
                // The parent is still running, failed, or already has a letter.
                // Content already reached the caller; drop rather than resend.
                warn!("Dropping cover letter for generation {generation_id}: {reason}");
                None
            }
            Err(e) => {
                warn!("Dropping cover letter for generation {generation_id}: {e}");
                None
            }
        }
    };

    let _ = tx.send(CoverLetterEvent::Done { artifact_id }).await;
}

/// Summary plus work and project highlights from a JSON Resume, one per line.
pub fn resume_highlights(resume: &Value) -> Option<String> {
    let mut lines = Vec::new();

    if let Some(summary) = resume.pointer("/basics/summary").and_then(Value::as_str) {
        if !summary.trim().is_empty() {
            lines.push(summary.trim().to_string());
        }
    }

    for section in ["work", "projects"] {
        let entries = resume.get(section).and_then(Value::as_array);
        for entry in entries.into_iter().flatten() {
            let label = entry
                .get("name")
                .or_else(|| entry.get("position"))
                .and_then(Value::as_str);
            let highlights = entry.get("highlights").and_then(Value::as_array);
            for highlight in highlights.into_iter().flatten().filter_map(Value::as_str) {
                let line = match label {
                    Some(label) => format!("- {label}: {}", highlight.trim()),
                    None => format!("- {}", highlight.trim()),
                };
                lines.push(line);
            }
        }
    }

    lines.truncate(MAX_HIGHLIGHTS + 1);
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
