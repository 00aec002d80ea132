use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A user's stored base resume, in JSON Resume form.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub json_resume: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
