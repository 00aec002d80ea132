use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::generation::{
    ArtifactFormat, ArtifactType, ErrorInfo, GeneratedArtifact, GenerationMetrics,
    GenerationRecord, GenerationStatus, NewArtifact, NewGeneration,
};
use crate::models::resume::ResumeRow;

const GENERATION_COLUMNS: &str = "id, user_id, jd_snapshot, resume_id, status, provider, model, \
     prompt_version, metrics_json, error_json, created_at, updated_at";

const ARTIFACT_COLUMNS: &str =
    r#"id, user_id, generation_id, "type" AS artifact_type, format, content, version, created_at"#;

// ────────────────────────────────────────────────────────────────────────────
// Row types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct GenerationRow {
    id: Uuid,
    user_id: Uuid,
    jd_snapshot: String,
    resume_id: Option<Uuid>,
    status: GenerationStatus,
    provider: String,
    model: String,
    prompt_version: String,
    metrics_json: Option<Value>,
    error_json: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GenerationRow> for GenerationRecord {
    type Error = StoreError;

    fn try_from(row: GenerationRow) -> Result<Self, Self::Error> {
        let metrics = row
            .metrics_json
            .map(serde_json::from_value::<GenerationMetrics>)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("metrics_json for {}: {e}", row.id)))?;
        let error_info = row
            .error_json
            .map(serde_json::from_value::<ErrorInfo>)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("error_json for {}: {e}", row.id)))?;

        Ok(GenerationRecord {
            id: row.id,
            owner_id: row.user_id,
            job_description_snapshot: row.jd_snapshot,
            base_resume_ref: row.resume_id,
            status: row.status,
            provider: row.provider,
            model_identifier: row.model,
            prompt_version: row.prompt_version,
            metrics,
            error_info,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ArtifactRow {
    id: Uuid,
    user_id: Uuid,
    generation_id: Uuid,
    artifact_type: ArtifactType,
    format: ArtifactFormat,
    content: Value,
    version: String,
    created_at: DateTime<Utc>,
}

impl From<ArtifactRow> for GeneratedArtifact {
    fn from(row: ArtifactRow) -> Self {
        GeneratedArtifact {
            id: row.id,
            owner_id: row.user_id,
            generation_id: row.generation_id,
            artifact_type: row.artifact_type,
            format: row.format,
            content: row.content,
            version: row.version,
            created_at: row.created_at,
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Maps a unique-constraint violation on artifacts to `Conflict`.
fn artifact_insert_error(e: sqlx::Error, artifact: &NewArtifact) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(format!(
            "{} artifact already exists for generation {}",
            artifact.artifact_type.as_str(),
            artifact.generation_id
        )),
        _ => StoreError::Database(e),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PgStore
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_resume(
        &self,
        owner_id: Uuid,
        resume_id: Uuid,
    ) -> Result<Option<ResumeRow>, StoreError> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT id, user_id, title, json_resume, created_at, updated_at \
             FROM resumes WHERE id = $1 AND user_id = $2",
        )
        .bind(resume_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_generation(&self, new: NewGeneration) -> Result<GenerationRecord, StoreError> {
        let row = sqlx::query_as::<_, GenerationRow>(&format!(
            r#"
            INSERT INTO ai_generations
                (user_id, jd_snapshot, resume_id, status, provider, model, prompt_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {GENERATION_COLUMNS}
            "#
        ))
        .bind(new.owner_id)
        .bind(&new.job_description_snapshot)
        .bind(new.base_resume_ref)
        .bind(GenerationStatus::Running)
        .bind(&new.provider)
        .bind(&new.model_identifier)
        .bind(&new.prompt_version)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_generation(
        &self,
        owner_id: Uuid,
        generation_id: Uuid,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        sqlx::query_as::<_, GenerationRow>(&format!(
            "SELECT {GENERATION_COLUMNS} FROM ai_generations WHERE id = $1 AND user_id = $2"
        ))
        .bind(generation_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .map(GenerationRecord::try_from)
        .transpose()
    }

    async fn succeed_generation(
        &self,
        generation_id: Uuid,
        metrics: GenerationMetrics,
        artifact: NewArtifact,
    ) -> Result<GeneratedArtifact, StoreError> {
        let metrics_json = to_json(&metrics)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE ai_generations
            SET status = $2, metrics_json = $3, updated_at = now()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(generation_id)
        .bind(GenerationStatus::Succeeded)
        .bind(&metrics_json)
        .bind(GenerationStatus::Running)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!(
                "generation {generation_id} is not running"
            )));
        }

        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            r#"
            INSERT INTO generated_documents
                (user_id, generation_id, "type", format, content, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ARTIFACT_COLUMNS}
            "#
        ))
        .bind(artifact.owner_id)
        .bind(artifact.generation_id)
        .bind(artifact.artifact_type)
        .bind(artifact.format)
        .bind(&artifact.content)
        .bind(&artifact.version)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| artifact_insert_error(e, &artifact))?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn fail_generation(
        &self,
        generation_id: Uuid,
        error: ErrorInfo,
    ) -> Result<(), StoreError> {
        let error_json = to_json(&error)?;
        let updated = sqlx::query(
            r#"
            UPDATE ai_generations
            SET status = $2, error_json = $3, updated_at = now()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(generation_id)
        .bind(GenerationStatus::Failed)
        .bind(&error_json)
        .bind(GenerationStatus::Running)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "generation {generation_id} is not running"
            )));
        }
        Ok(())
    }

    async fn insert_artifact(
        &self,
        artifact: NewArtifact,
    ) -> Result<GeneratedArtifact, StoreError> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            r#"
            INSERT INTO generated_documents
                (user_id, generation_id, "type", format, content, version)
            SELECT $1::uuid, $2::uuid, $3::generated_document_type,
                   $4::generated_document_format, $5::jsonb, $6::text
            WHERE EXISTS (
                SELECT 1 FROM ai_generations
                WHERE id = $2 AND user_id = $1 AND status = $7
            )
            RETURNING {ARTIFACT_COLUMNS}
            "#
        ))
        .bind(artifact.owner_id)
        .bind(artifact.generation_id)
        .bind(artifact.artifact_type)
        .bind(artifact.format)
        .bind(&artifact.content)
        .bind(&artifact.version)
        .bind(GenerationStatus::Succeeded)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| artifact_insert_error(e, &artifact))?;

        row.map(Into::into).ok_or_else(|| {
            StoreError::Conflict(format!(
                "generation {} is not succeeded",
                artifact.generation_id
            ))
        })
    }

    async fn find_artifact(
        &self,
        owner_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<Option<GeneratedArtifact>, StoreError> {
        Ok(sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM generated_documents WHERE id = $1 AND user_id = $2"
        ))
        .bind(artifact_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into))
    }

    async fn find_artifact_for_generation(
        &self,
        owner_id: Uuid,
        generation_id: Uuid,
        artifact_type: ArtifactType,
    ) -> Result<Option<GeneratedArtifact>, StoreError> {
        Ok(sqlx::query_as::<_, ArtifactRow>(&format!(
            r#"
            SELECT {ARTIFACT_COLUMNS} FROM generated_documents
            WHERE generation_id = $1 AND user_id = $2 AND "type" = $3
            "#
        ))
        .bind(generation_id)
        .bind(owner_id)
        .bind(artifact_type)
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into))
    }

    async fn fail_stale_generations(
        &self,
        cutoff: DateTime<Utc>,
        error: ErrorInfo,
    ) -> Result<u64, StoreError> {
        let error_json = to_json(&error)?;
        let swept = sqlx::query(
            r#"
            UPDATE ai_generations
            SET status = $1, error_json = $2, updated_at = now()
            WHERE status = $3 AND created_at < $4
            "#,
        )
        .bind(GenerationStatus::Failed)
        .bind(&error_json)
        .bind(GenerationStatus::Running)
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if swept > 0 {
            info!("Marked {swept} abandoned generation(s) as failed");
        }
        Ok(swept)
    }
}
