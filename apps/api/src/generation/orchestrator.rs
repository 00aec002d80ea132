//! Generation lifecycle: `running` → `succeeded` | `failed`.
//!
//! Everything that can be rejected cheaply (identity, rate limit, payload,
//! base resume) is rejected before the `running` record is written. Once the
//! record exists, every path ends in exactly one terminal write.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Caller;
use crate::errors::AppError;
use crate::generation::prompts::{build_resume_prompt, PromptOptions, PROMPT_VERSION};
use crate::llm_client::Generator;
use crate::models::generation::{
    ArtifactFormat, ArtifactType, ErrorInfo, GenerationMetrics, GenerationRecord,
    GenerationStatus, NewArtifact, NewGeneration,
};
use crate::rate_limit::RateLimitDecision;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateGenerationRequest {
    pub jd_text: Option<String>,
    pub base_resume_id: Option<Uuid>,
    #[serde(default)]
    pub pro: bool,
    pub tone: Option<String>,
    pub seniority: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateGenerationResponse {
    pub id: Uuid,
    pub status: GenerationStatus,
    pub artifact_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct GenerationStatusResponse {
    pub id: Uuid,
    pub status: GenerationStatus,
    pub provider: String,
    pub model: String,
    pub prompt_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<GenerationMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_artifact_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_letter_artifact_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Shared gates
// ────────────────────────────────────────────────────────────────────────────

/// Consults both counters; a deny aborts before any other work.
pub async fn enforce_rate_limit(state: &AppState, caller: &Caller) -> Result<(), AppError> {
    let user_key = caller.user_id.to_string();
    match state
        .limiter
        .check(Some(&user_key), caller.origin.as_deref())
        .await
    {
        RateLimitDecision::Allow => Ok(()),
        RateLimitDecision::Deny {
            scope,
            retry_after_secs,
        } => Err(AppError::RateLimited {
            scope,
            retry_after_secs,
        }),
    }
}

/// Returns the trimmed text, or InvalidInput naming `field`.
pub fn required_text<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("{field} is required")))
}

// ────────────────────────────────────────────────────────────────────────────
// Create
// ────────────────────────────────────────────────────────────────────────────

/// Runs one generation end to end.
///
/// `payload` arrives unparsed-on-error so that the rate limit is charged
/// before the body is judged.
pub async fn create_generation(
    state: &AppState,
    caller: &Caller,
    payload: Result<CreateGenerationRequest, AppError>,
) -> Result<CreateGenerationResponse, AppError> {
    // Step 1: Rate limit
    enforce_rate_limit(state, caller).await?;

    // Step 2: Input validation
    let request = payload?;
    required_text(request.jd_text.as_deref(), "jd_text")?;
    let jd_snapshot = request.jd_text.clone().unwrap_or_default();

    // Step 3: Base resume
    let base_resume = match request.base_resume_id {
        Some(resume_id) => Some(load_base_resume(state, caller.user_id, resume_id).await?),
        None => None,
    };

    // Step 4: Persist running record
    let generator = state.generators.for_tier(request.pro);
    let record = state
        .store
        .insert_generation(NewGeneration {
            owner_id: caller.user_id,
            job_description_snapshot: jd_snapshot.clone(),
            base_resume_ref: request.base_resume_id,
            provider: generator.provider().to_string(),
            model_identifier: generator.model().to_string(),
            prompt_version: PROMPT_VERSION.to_string(),
        })
        .await?;
    info!(
        "Generation {} running for user {} (model: {})",
        record.id,
        caller.user_id,
        generator.model()
    );

    // Step 5-7: Generate, validate, persist
    let base_text = base_resume.as_ref().map(|resume| resume.to_string());
    let options = PromptOptions {
        tone: request.tone.as_deref(),
        seniority: request.seniority.as_deref(),
    };
    let prompt = build_resume_prompt(&jd_snapshot, base_text.as_deref(), &options);

    match run_generation(state, generator.as_ref(), &record, &prompt).await {
        Ok(artifact_id) => {
            info!("Generation {} succeeded (artifact {})", record.id, artifact_id);
            Ok(CreateGenerationResponse {
                id: record.id,
                status: GenerationStatus::Succeeded,
                artifact_id,
            })
        }
        Err(failure) => {
            record_failure(state, record.id, &failure).await;
            Err(AppError::GenerationFailed {
                generation_id: record.id,
                message: failure.message,
            })
        }
    }
}

/// Fetches an owned base resume and gates it on the JSON Resume schema.
async fn load_base_resume(
    state: &AppState,
    owner_id: Uuid,
    resume_id: Uuid,
) -> Result<serde_json::Value, AppError> {
    let resume = state
        .store
        .find_resume(owner_id, resume_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Resume not found".to_string()))?;

    state
        .validators
        .json_resume
        .check(&resume.json_resume)
        .map_err(|errors| AppError::SchemaInvalid {
            message: "Resume schema invalid".to_string(),
            errors,
        })?;

    Ok(resume.json_resume)
}

// ────────────────────────────────────────────────────────────────────────────
// Generator stage
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct GenerationFailure {
    message: String,
    violations: Vec<String>,
}

impl GenerationFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            violations: Vec::new(),
        }
    }
}

/// Steps 5-7. On success the artifact and the `succeeded` flip are already committed.
async fn run_generation(
    state: &AppState,
    generator: &dyn Generator,
    record: &GenerationRecord,
    prompt: &str,
) -> Result<Uuid, GenerationFailure> {
    let timeout = state.config.generation_timeout;
    let started = Instant::now();

    let generated = tokio::time::timeout(
        timeout,
        generator.generate(prompt, &state.validators.structural),
    )
    .await
    .map_err(|_| {
        GenerationFailure::new(format!(
            "generator timed out after {}s",
            timeout.as_secs()
        ))
    })?
    .map_err(|e| GenerationFailure::new(format!("generator error: {e}")))?;

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if let Err(violations) = state.validators.json_resume.check(&generated.object) {
        return Err(GenerationFailure {
            message: format!(
                "generated resume failed schema validation: {}",
                violations.join("; ")
            ),
            violations,
        });
    }

    let artifact = state
        .store
        .succeed_generation(
            record.id,
            GenerationMetrics {
                duration_ms,
                usage: generated.usage,
            },
            NewArtifact {
                owner_id: record.owner_id,
                generation_id: record.id,
                artifact_type: ArtifactType::Resume,
                format: ArtifactFormat::Jsonresume,
                content: generated.object,
                version: record.prompt_version.clone(),
            },
        )
        .await
        .map_err(|e| GenerationFailure::new(format!("failed to persist generation result: {e}")))?;

    Ok(artifact.id)
}

/// Best-effort terminal write. A record that cannot be failed here is left for
/// the stale-generation sweep.
async fn record_failure(state: &AppState, generation_id: Uuid, failure: &GenerationFailure) {
    warn!("Generation {generation_id} failed: {}", failure.message);
    let info = ErrorInfo {
        message: failure.message.clone(),
        violations: failure.violations.clone(),
    };
    if let Err(e) = state.store.fail_generation(generation_id, info).await {
        error!("Could not mark generation {generation_id} as failed: {e}");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Status
// ────────────────────────────────────────────────────────────────────────────

pub async fn get_generation_status(
    state: &AppState,
    caller: &Caller,
    generation_id: Uuid,
) -> Result<GenerationStatusResponse, AppError> {
    let record = state
        .store
        .find_generation(caller.user_id, generation_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Generation not found".to_string()))?;

    let (resume_artifact_id, cover_letter_artifact_id) = if record.status
        == GenerationStatus::Running
    {
        (None, None)
    } else {
        let resume = state
            .store
            .find_artifact_for_generation(caller.user_id, record.id, ArtifactType::Resume)
            .await?;
        let letter = state
            .store
            .find_artifact_for_generation(caller.user_id, record.id, ArtifactType::CoverLetter)
            .await?;
        (resume.map(|a| a.id), letter.map(|a| a.id))
    };

    Ok(GenerationStatusResponse {
        id: record.id,
        status: record.status,
        provider: record.provider,
        model: record.model_identifier,
        prompt_version: record.prompt_version,
        metrics: record.metrics,
        error: record.error_info,
        resume_artifact_id,
        cover_letter_artifact_id,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}
