/// Note session
///
/// One context object per signed-in user: resolves the instance id, opens the
/// per-instance store and wires the reconciliation engine, connectivity
/// monitor and scheduler together. User-facing note operations go through it.

use notesync_core::{
    FileStorage, InstanceId, InstanceRegistry, LocalNoteStore, MemoryStorage, Note, NoteChanges,
    NoteDraft, Storage, StorageConfig, StoreStats,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::http::HttpTransport;
use crate::engine::{PullReport, PushReport, ReconciliationEngine, SyncReport, SyncState};
use crate::protocol::RemoteEndpoint;
use crate::scheduler::Scheduler;
use crate::{Result, SyncError, SyncStats};

const REGISTRY_DIR: &str = "registry";
const INSTANCES_DIR: &str = "instances";

/// Result of a user-initiated delete
#[derive(Debug)]
pub enum DeleteOutcome {
    /// The server deleted the note; no tombstone was needed
    Confirmed,
    /// Deleted locally; the tombstone will be pushed on the next sync
    Deferred { error: SyncError },
}

impl DeleteOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, DeleteOutcome::Confirmed)
    }
}

/// Snapshot for status displays
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub instance_id: InstanceId,
    pub user_key: Option<String>,
    pub online: bool,
    pub state: SyncState,
    pub store: StoreStats,
    pub sync: SyncStats,
}

enum StorageLocation {
    Memory,
    Directory(PathBuf),
}

/// Builder for a `NoteSession`
pub struct SessionBuilder {
    config: SyncConfig,
    storage_config: StorageConfig,
    location: StorageLocation,
    user_key: Option<String>,
    instance_id: Option<InstanceId>,
    remote: Option<Arc<dyn RemoteEndpoint>>,
    connectivity: Option<Connectivity>,
}

impl SessionBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            storage_config: StorageConfig::default(),
            location: StorageLocation::Memory,
            user_key: None,
            instance_id: None,
            remote: None,
            connectivity: None,
        }
    }

    /// Persist notes and the instance registry under `dir`
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.location = StorageLocation::Directory(dir.as_ref().to_path_buf());
        self
    }

    /// Keep everything in memory
    pub fn in_memory(mut self) -> Self {
        self.location = StorageLocation::Memory;
        self
    }

    pub fn with_storage_config(mut self, config: StorageConfig) -> Self {
        self.storage_config = config;
        self
    }

    /// Resolve the instance id through the registry for this user
    pub fn with_user(mut self, user_key: impl Into<String>) -> Self {
        self.user_key = Some(user_key.into());
        self
    }

    /// Use a known instance id, bypassing the registry
    pub fn with_instance_id(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    /// Use a custom endpoint instead of HTTP against `server_url`
    pub fn with_remote(mut self, remote: Arc<dyn RemoteEndpoint>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Open storage and assemble the session.
    ///
    /// Unavailable local storage is returned immediately as a fatal store
    /// error; nothing is started.
    pub fn build(self) -> Result<NoteSession> {
        self.config.validate().map_err(SyncError::Config)?;
        let remote: Arc<dyn RemoteEndpoint> = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpTransport::new(
                self.config.server_url.clone(),
                self.config.request_timeout,
            )?),
        };

        let instance_id = match (self.instance_id, self.user_key.as_deref()) {
            (Some(id), _) => id,
            (None, Some(user_key)) => {
                let registry = registry_for(&self.location, &self.storage_config)?;
                let id = registry.resolve_or_create(user_key)?;
                registry.set_current_user(user_key)?;
                id
            }
            (None, None) => {
                return Err(SyncError::Config(
                    "a user key or instance id is required".to_string(),
                ))
            }
        };

        let storage: Arc<dyn Storage> = match &self.location {
            StorageLocation::Memory => Arc::new(MemoryStorage::new()),
            StorageLocation::Directory(dir) => Arc::new(FileStorage::open_with_config(
                dir.join(INSTANCES_DIR).join(instance_id.as_str()),
                self.storage_config.clone(),
            )?),
        };

        let store = Arc::new(
            LocalNoteStore::new(storage, instance_id.clone())
                .with_commit_retry(self.storage_config.commit_retry.clone()),
        );
        let connectivity = self.connectivity.unwrap_or_default();
        let engine = Arc::new(ReconciliationEngine::new(
            store.clone(),
            remote,
            connectivity.clone(),
            self.config.clone(),
        )?);

        tracing::info!(
            instance_id = %instance_id,
            user = self.user_key.as_deref().unwrap_or("-"),
            "note session opened"
        );

        Ok(NoteSession {
            user_key: self.user_key,
            instance_id,
            store,
            engine,
            connectivity,
            config: self.config,
        })
    }
}

/// Open the device-wide instance registry kept under `data_dir`
pub fn open_registry(data_dir: &Path, storage_config: &StorageConfig) -> Result<InstanceRegistry> {
    let storage = FileStorage::open_with_config(data_dir.join(REGISTRY_DIR), storage_config.clone())?;
    Ok(InstanceRegistry::new(Arc::new(storage)).with_commit_retry(storage_config.commit_retry.clone()))
}

fn registry_for(location: &StorageLocation, storage_config: &StorageConfig) -> Result<InstanceRegistry> {
    match location {
        StorageLocation::Memory => Ok(InstanceRegistry::new(Arc::new(MemoryStorage::new()))
            .with_commit_retry(storage_config.commit_retry.clone())),
        StorageLocation::Directory(dir) => open_registry(dir, storage_config),
    }
}

pub struct NoteSession {
    user_key: Option<String>,
    instance_id: InstanceId,
    store: Arc<LocalNoteStore>,
    engine: Arc<ReconciliationEngine>,
    connectivity: Connectivity,
    config: SyncConfig,
}

impl NoteSession {
    pub fn builder(config: SyncConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn user_key(&self) -> Option<&str> {
        self.user_key.as_deref()
    }

    pub fn store(&self) -> &Arc<LocalNoteStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn create_note(&self, draft: NoteDraft) -> Result<Note> {
        Ok(self.store.create_note(draft)?)
    }

    pub fn update_note(&self, id: &str, changes: NoteChanges) -> Result<Note> {
        Ok(self.store.update_note(id, changes)?)
    }

    pub fn get_note(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.store.get(id)?)
    }

    pub fn list_notes(&self) -> Result<Vec<Note>> {
        Ok(self.store.get_all()?)
    }

    /// Delete a note, on the server first when online.
    ///
    /// When the server confirms, the note is removed locally with no
    /// tombstone. Otherwise it is removed locally together with a tombstone,
    /// and the failure is returned in `DeleteOutcome::Deferred`.
    pub async fn delete_note(&self, id: &str) -> Result<DeleteOutcome> {
        if id.trim().is_empty() {
            return Err(notesync_core::Error::InvalidNote("note id is missing".to_string()).into());
        }

        let error = match self.engine.delete_remote(id).await {
            Ok(true) => {
                self.store.delete(id)?;
                self.store.remove_tombstones(&[id.to_string()])?;
                tracing::debug!(note_id = %id, "note deleted on server");
                return Ok(DeleteOutcome::Confirmed);
            }
            Ok(false) => SyncError::InvalidResponse(format!("server did not delete note {}", id)),
            Err(e) => e,
        };

        self.store.delete_with_tombstone(id)?;
        tracing::debug!(note_id = %id, error = %error, "deletion deferred to next sync");
        Ok(DeleteOutcome::Deferred { error })
    }

    pub async fn sync(&self) -> Result<SyncReport> {
        self.engine.sync().await
    }

    pub async fn push(&self) -> Result<PushReport> {
        self.engine.sync_outgoing().await
    }

    pub async fn pull(&self) -> Result<PullReport> {
        self.engine.sync_incoming().await
    }

    /// Scheduler bound to this session's engine and connectivity
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.engine.clone(), self.connectivity.clone(), &self.config)
    }

    pub fn status(&self) -> Result<SessionStatus> {
        Ok(SessionStatus {
            instance_id: self.instance_id.clone(),
            user_key: self.user_key.clone(),
            online: self.connectivity.is_online(),
            state: self.engine.get_state(),
            store: self.store.stats()?,
            sync: self.engine.get_stats(),
        })
    }
}
