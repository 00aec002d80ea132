//! Persistence seam for resumes, generation records, and generated artifacts.
//!
//! Every read is scoped by owner: a row owned by someone else is indistinguishable
//! from a missing row.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::generation::{
    ArtifactType, ErrorInfo, GeneratedArtifact, GenerationMetrics, GenerationRecord, NewArtifact,
    NewGeneration,
};
use crate::models::resume::ResumeRow;

#[cfg(test)]
pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness or state precondition did not hold (duplicate artifact,
    /// generation already terminal).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("stored data is malformed: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_resume(&self, owner_id: Uuid, resume_id: Uuid)
        -> Result<Option<ResumeRow>, StoreError>;

    /// Inserts a record in `running` status.
    async fn insert_generation(&self, new: NewGeneration) -> Result<GenerationRecord, StoreError>;

    async fn find_generation(
        &self,
        owner_id: Uuid,
        generation_id: Uuid,
    ) -> Result<Option<GenerationRecord>, StoreError>;

    /// Writes the artifact and flips `running` → `succeeded` atomically.
    /// Returns `Conflict` if the record is no longer running.
    async fn succeed_generation(
        &self,
        generation_id: Uuid,
        metrics: GenerationMetrics,
        artifact: NewArtifact,
    ) -> Result<GeneratedArtifact, StoreError>;

    /// Flips `running` → `failed`. Returns `Conflict` if the record is no longer running.
    async fn fail_generation(&self, generation_id: Uuid, error: ErrorInfo)
        -> Result<(), StoreError>;

    /// Inserts a standalone artifact. The parent generation must be `succeeded`
    /// and owned by the artifact's owner, and at most one artifact may exist per
    /// (generation, type); either violation is `Conflict`.
    async fn insert_artifact(&self, artifact: NewArtifact)
        -> Result<GeneratedArtifact, StoreError>;

    async fn find_artifact(
        &self,
        owner_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<Option<GeneratedArtifact>, StoreError>;

    async fn find_artifact_for_generation(
        &self,
        owner_id: Uuid,
        generation_id: Uuid,
        artifact_type: ArtifactType,
    ) -> Result<Option<GeneratedArtifact>, StoreError>;

    /// Fails every record still `running` that was created before `cutoff`.
    /// Returns the number of records swept.
    async fn fail_stale_generations(
        &self,
        cutoff: DateTime<Utc>,
        error: ErrorInfo,
    ) -> Result<u64, StoreError>;
}
