/// Sync metadata storage
///
/// Persists per-instance sync statistics and pass timestamps in the `meta`
/// keyspace of the instance's storage, next to the notes they describe.

use chrono::{DateTime, Utc};
use notesync_core::{InstanceId, Keyspace, Storage, WriteBatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::SyncStats;

const SYNC_METADATA_PREFIX: &str = "_sync#metadata#";

/// Sync metadata stored alongside the notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub instance_id: InstanceId,
    pub stats: SyncStats,
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncMetadata {
    pub fn new(instance_id: InstanceId) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            instance_id,
            stats: SyncStats::default(),
            last_push_at: None,
            last_pull_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }
}

/// Storage operations for sync metadata
pub struct SyncMetadataStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl SyncMetadataStore {
    pub fn new(storage: Arc<dyn Storage>, instance_id: &InstanceId) -> Self {
        Self {
            storage,
            key: format!("{}{}", SYNC_METADATA_PREFIX, instance_id),
        }
    }

    /// Load existing metadata or start fresh for the instance
    pub fn load_or_init(&self, instance_id: &InstanceId) -> notesync_core::Result<SyncMetadata> {
        Ok(self
            .load_metadata()?
            .unwrap_or_else(|| SyncMetadata::new(instance_id.clone())))
    }

    pub fn save_metadata(&self, metadata: &SyncMetadata) -> notesync_core::Result<()> {
        let json = serde_json::to_vec(metadata)?;
        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Meta, self.key.clone(), json);
        self.storage.commit(batch)
    }

    pub fn load_metadata(&self) -> notesync_core::Result<Option<SyncMetadata>> {
        match self.storage.get(Keyspace::Meta, &self.key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::MemoryStorage;

    #[test]
    fn test_save_and_load() {
        let storage = Arc::new(MemoryStorage::new());
        let instance = InstanceId::parse("inst").unwrap();
        let store = SyncMetadataStore::new(storage, &instance);

        assert!(store.load_metadata().unwrap().is_none());

        let mut metadata = store.load_or_init(&instance).unwrap();
        metadata.stats.successful_syncs = 3;
        metadata.last_error = Some("timeout".to_string());
        store.save_metadata(&metadata).unwrap();

        assert_eq!(store.load_metadata().unwrap(), Some(metadata));
    }

    #[test]
    fn test_metadata_is_per_instance() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let a = InstanceId::parse("a").unwrap();
        let b = InstanceId::parse("b").unwrap();

        SyncMetadataStore::new(storage.clone(), &a)
            .save_metadata(&SyncMetadata::new(a.clone()))
            .unwrap();
        assert!(SyncMetadataStore::new(storage, &b)
            .load_metadata()
            .unwrap()
            .is_none());
    }
}
