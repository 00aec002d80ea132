//! In-memory `Store` used by the orchestration and router tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::generation::{
    ArtifactType, ErrorInfo, GeneratedArtifact, GenerationMetrics, GenerationRecord,
    GenerationStatus, NewArtifact, NewGeneration,
};
use crate::models::resume::ResumeRow;

#[derive(Default)]
struct Tables {
    resumes: HashMap<Uuid, ResumeRow>,
    generations: HashMap<Uuid, GenerationRecord>,
    artifacts: HashMap<Uuid, GeneratedArtifact>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resume(&self, owner_id: Uuid, json_resume: Value) -> Uuid {
        let now = Utc::now();
        let row = ResumeRow {
            id: Uuid::new_v4(),
            user_id: owner_id,
            title: None,
            json_resume,
            created_at: now,
            updated_at: now,
        };
        let id = row.id;
        self.lock().resumes.insert(id, row);
        id
    }

    /// Every generation record, newest last.
    pub fn generations(&self) -> Vec<GenerationRecord> {
        let mut all: Vec<_> = self.lock().generations.values().cloned().collect();
        all.sort_by_key(|g| g.created_at);
        all
    }

    pub fn artifacts(&self) -> Vec<GeneratedArtifact> {
        let mut all: Vec<_> = self.lock().artifacts.values().cloned().collect();
        all.sort_by_key(|a| a.created_at);
        all
    }

    /// Rewrites a record's creation time so sweeps can be exercised.
    pub fn backdate_generation(&self, generation_id: Uuid, created_at: DateTime<Utc>) {
        if let Some(g) = self.lock().generations.get_mut(&generation_id) {
            g.created_at = created_at;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn build_artifact(tables: &Tables, artifact: NewArtifact) -> Result<GeneratedArtifact, StoreError> {
    let duplicate = tables.artifacts.values().any(|a| {
        a.generation_id == artifact.generation_id && a.artifact_type == artifact.artifact_type
    });
    if duplicate {
        return Err(StoreError::Conflict(format!(
            "{} artifact already exists for generation {}",
            artifact.artifact_type.as_str(),
            artifact.generation_id
        )));
    }
    Ok(GeneratedArtifact {
        id: Uuid::new_v4(),
        owner_id: artifact.owner_id,
        generation_id: artifact.generation_id,
        artifact_type: artifact.artifact_type,
        format: artifact.format,
        content: artifact.content,
        version: artifact.version,
        created_at: Utc::now(),
    })
}

fn running_mut(
    tables: &mut Tables,
    generation_id: Uuid,
) -> Result<&mut GenerationRecord, StoreError> {
    match tables.generations.get_mut(&generation_id) {
        Some(g) if g.status == GenerationStatus::Running => Ok(g),
        _ => Err(StoreError::Conflict(format!(
            "generation {generation_id} is not running"
        ))),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_resume(
        &self,
        owner_id: Uuid,
        resume_id: Uuid,
    ) -> Result<Option<ResumeRow>, StoreError> {
        Ok(self
            .lock()
            .resumes
            .get(&resume_id)
            .filter(|r| r.user_id == owner_id)
            .cloned())
    }

    async fn insert_generation(&self, new: NewGeneration) -> Result<GenerationRecord, StoreError> {
        let now = Utc::now();
        let record = GenerationRecord {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            job_description_snapshot: new.job_description_snapshot,
            base_resume_ref: new.base_resume_ref,
            status: GenerationStatus::Running,
            provider: new.provider,
            model_identifier: new.model_identifier,
            prompt_version: new.prompt_version,
            metrics: None,
            error_info: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().generations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_generation(
        &self,
        owner_id: Uuid,
        generation_id: Uuid,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(self
            .lock()
            .generations
            .get(&generation_id)
            .filter(|g| g.owner_id == owner_id)
            .cloned())
    }

    async fn succeed_generation(
        &self,
        generation_id: Uuid,
        metrics: GenerationMetrics,
        artifact: NewArtifact,
    ) -> Result<GeneratedArtifact, StoreError> {
        let mut tables = self.lock();
        running_mut(&mut tables, generation_id)?;
        let stored = build_artifact(&tables, artifact)?;

        let record = running_mut(&mut tables, generation_id)?;
        record.status = GenerationStatus::Succeeded;
        record.metrics = Some(metrics);
        record.updated_at = Utc::now();

        tables.artifacts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn fail_generation(
        &self,
        generation_id: Uuid,
        error: ErrorInfo,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let record = running_mut(&mut tables, generation_id)?;
        record.status = GenerationStatus::Failed;
        record.error_info = Some(error);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_artifact(
        &self,
        artifact: NewArtifact,
    ) -> Result<GeneratedArtifact, StoreError> {
        let mut tables = self.lock();
        let parent_succeeded = tables.generations.get(&artifact.generation_id).is_some_and(|g| {
            g.owner_id == artifact.owner_id && g.status == GenerationStatus::Succeeded
        });
        if !parent_succeeded {
            return Err(StoreError::Conflict(format!(
                "generation {} is not succeeded",
                artifact.generation_id
            )));
        }
        let stored = build_artifact(&tables, artifact)?;
        tables.artifacts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_artifact(
        &self,
        owner_id: Uuid,
        artifact_id: Uuid,
    ) -> Result<Option<GeneratedArtifact>, StoreError> {
        Ok(self
            .lock()
            .artifacts
            .get(&artifact_id)
            .filter(|a| a.owner_id == owner_id)
            .cloned())
    }

    async fn find_artifact_for_generation(
        &self,
        owner_id: Uuid,
        generation_id: Uuid,
        artifact_type: ArtifactType,
    ) -> Result<Option<GeneratedArtifact>, StoreError> {
        Ok(self
            .lock()
            .artifacts
            .values()
            .find(|a| {
                a.owner_id == owner_id
                    && a.generation_id == generation_id
                    && a.artifact_type == artifact_type
            })
            .cloned())
    }

    async fn fail_stale_generations(
        &self,
        cutoff: DateTime<Utc>,
        error: ErrorInfo,
    ) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let now = Utc::now();
        let mut swept = 0;
        for record in tables.generations.values_mut() {
            if record.status == GenerationStatus::Running && record.created_at < cutoff {
                record.status = GenerationStatus::Failed;
                record.error_info = Some(error.clone());
                record.updated_at = now;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generation::{ArtifactFormat, TokenUsage};
    use serde_json::json;

    fn new_generation(owner_id: Uuid) -> NewGeneration {
        NewGeneration {
            owner_id,
            job_description_snapshot: "Rust engineer".to_string(),
            base_resume_ref: None,
            provider: "anthropic".to_string(),
            model_identifier: "test-model".to_string(),
            prompt_version: "v".to_string(),
        }
    }

    fn resume_artifact(owner_id: Uuid, generation_id: Uuid) -> NewArtifact {
        NewArtifact {
            owner_id,
            generation_id,
            artifact_type: ArtifactType::Resume,
            format: ArtifactFormat::Jsonresume,
            content: json!({ "basics": { "name": "A" } }),
            version: "v".to_string(),
        }
    }

    fn metrics() -> GenerationMetrics {
        GenerationMetrics {
            duration_ms: 5,
            usage: TokenUsage::new(1, 2),
        }
    }

    #[tokio::test]
    async fn test_terminal_status_is_written_once() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let g = store.insert_generation(new_generation(owner)).await.unwrap();

        store
            .succeed_generation(g.id, metrics(), resume_artifact(owner, g.id))
            .await
            .unwrap();

        assert!(matches!(
            store.fail_generation(g.id, ErrorInfo::new("late")).await,
            Err(StoreError::Conflict(_))
        ));
        let record = store.find_generation(owner, g.id).await.unwrap().unwrap();
        assert_eq!(record.status, GenerationStatus::Succeeded);
        assert!(record.error_info.is_none());
    }

    fn cover_letter(owner_id: Uuid, generation_id: Uuid) -> NewArtifact {
        NewArtifact {
            owner_id,
            generation_id,
            artifact_type: ArtifactType::CoverLetter,
            format: ArtifactFormat::Markdown,
            content: Value::String("Dear team".to_string()),
            version: "v".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_artifact_type_conflicts() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let g = store.insert_generation(new_generation(owner)).await.unwrap();
        store
            .succeed_generation(g.id, metrics(), resume_artifact(owner, g.id))
            .await
            .unwrap();

        assert!(matches!(
            store.insert_artifact(resume_artifact(owner, g.id)).await,
            Err(StoreError::Conflict(_))
        ));
        store.insert_artifact(cover_letter(owner, g.id)).await.unwrap();
        assert!(matches!(
            store.insert_artifact(cover_letter(owner, g.id)).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_artifact_requires_succeeded_owned_parent() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let running = store.insert_generation(new_generation(owner)).await.unwrap();
        assert!(matches!(
            store.insert_artifact(cover_letter(owner, running.id)).await,
            Err(StoreError::Conflict(_))
        ));

        store
            .fail_generation(running.id, ErrorInfo::new("boom"))
            .await
            .unwrap();
        assert!(matches!(
            store.insert_artifact(cover_letter(owner, running.id)).await,
            Err(StoreError::Conflict(_))
        ));

        let done = store.insert_generation(new_generation(owner)).await.unwrap();
        store
            .succeed_generation(done.id, metrics(), resume_artifact(owner, done.id))
            .await
            .unwrap();
        assert!(matches!(
            store.insert_artifact(cover_letter(Uuid::new_v4(), done.id)).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.insert_artifact(cover_letter(owner, Uuid::new_v4())).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.artifacts().len(), 1);
    }

    #[tokio::test]
    async fn test_reads_are_owner_scoped() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let g = store.insert_generation(new_generation(owner)).await.unwrap();
        assert!(store
            .find_generation(Uuid::new_v4(), g.id)
            .await
            .unwrap()
            .is_none());
    }
}
