//! Sweeps generations left `running` by a crashed or killed process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::models::generation::ErrorInfo;
use crate::store::{Store, StoreError};

pub const ABANDONED_MESSAGE: &str = "generation abandoned before completion";

/// Fails every generation that has been `running` for longer than `stale_after`.
pub async fn reconcile_once(store: &dyn Store, stale_after: Duration) -> Result<u64, StoreError> {
    let stale_after = chrono::Duration::from_std(stale_after)
        .map_err(|e| StoreError::Corrupt(format!("stale window out of range: {e}")))?;
    let cutoff = Utc::now() - stale_after;
    store
        .fail_stale_generations(cutoff, ErrorInfo::new(ABANDONED_MESSAGE))
        .await
}

pub fn spawn_reconciler(
    store: Arc<dyn Store>,
    stale_after: Duration,
    every: Duration,
) -> JoinHandle<()> {
    info!(
        "Stale-generation sweep every {}s (threshold {}s)",
        every.as_secs(),
        stale_after.as_secs()
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = reconcile_once(store.as_ref(), stale_after).await {
                error!("Stale-generation sweep failed: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generation::{GenerationStatus, NewGeneration};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn new_generation() -> NewGeneration {
        NewGeneration {
            owner_id: Uuid::new_v4(),
            job_description_snapshot: "Rust role".to_string(),
            base_resume_ref: None,
            provider: "anthropic".to_string(),
            model_identifier: "m".to_string(),
            prompt_version: "v".to_string(),
        }
    }

    #[tokio::test]
    async fn test_only_old_running_records_are_swept() {
        let store = MemoryStore::new();
        let stale = store.insert_generation(new_generation()).await.unwrap();
        let fresh = store.insert_generation(new_generation()).await.unwrap();
        store.backdate_generation(stale.id, Utc::now() - chrono::Duration::minutes(30));

        let swept = reconcile_once(&store, Duration::from_secs(15 * 60))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let stale = store
            .find_generation(stale.owner_id, stale.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.status, GenerationStatus::Failed);
        assert_eq!(stale.error_info.unwrap().message, ABANDONED_MESSAGE);

        let fresh = store
            .find_generation(fresh.owner_id, fresh.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.status, GenerationStatus::Running);
    }

    #[tokio::test]
    async fn test_terminal_records_are_untouched() {
        let store = MemoryStore::new();
        let done = store.insert_generation(new_generation()).await.unwrap();
        store
            .fail_generation(done.id, ErrorInfo::new("boom"))
            .await
            .unwrap();
        store.backdate_generation(done.id, Utc::now() - chrono::Duration::hours(2));

        assert_eq!(
            reconcile_once(&store, Duration::from_secs(60)).await.unwrap(),
            0
        );
        let done = store
            .find_generation(done.owner_id, done.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.error_info.unwrap().message, "boom");
    }
}
