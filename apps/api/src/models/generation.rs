use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of one generation: `running` → `succeeded` | `failed`, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ai_generation_status", rename_all = "snake_case")]
pub enum GenerationStatus {
    Running,
    Succeeded,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Running => "running",
            GenerationStatus::Succeeded => "succeeded",
            GenerationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "generated_document_type", rename_all = "snake_case")]
pub enum ArtifactType {
    Resume,
    CoverLetter,
}

impl ArtifactType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactType::Resume => "resume",
            ArtifactType::CoverLetter => "cover_letter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "generated_document_format", rename_all = "snake_case")]
pub enum ArtifactFormat {
    Jsonresume,
    Markdown,
}

/// Token accounting reported by the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// Recorded only on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub duration_ms: u64,
    pub usage: TokenUsage,
}

/// Recorded only on failure. `violations` holds formatted schema errors, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            violations: Vec::new(),
        }
    }
}

/// One attempt to produce a tailored document. Visible to and mutable by its owner only.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub job_description_snapshot: String,
    pub base_resume_ref: Option<Uuid>,
    pub status: GenerationStatus,
    pub provider: String,
    pub model_identifier: String,
    pub prompt_version: String,
    pub metrics: Option<GenerationMetrics>,
    pub error_info: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a generation enters `running`.
#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub owner_id: Uuid,
    pub job_description_snapshot: String,
    pub base_resume_ref: Option<Uuid>,
    pub provider: String,
    pub model_identifier: String,
    pub prompt_version: String,
}

/// A persisted output document. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedArtifact {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub generation_id: Uuid,
    pub artifact_type: ArtifactType,
    pub format: ArtifactFormat,
    /// A JSON Resume object, or a JSON string holding markdown.
    pub content: Value,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedArtifact {
    pub fn markdown(&self) -> Option<&str> {
        match self.format {
            ArtifactFormat::Markdown => self.content.as_str(),
            ArtifactFormat::Jsonresume => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub owner_id: Uuid,
    pub generation_id: Uuid,
    pub artifact_type: ArtifactType,
    pub format: ArtifactFormat,
    pub content: Value,
    pub version: String,
}
