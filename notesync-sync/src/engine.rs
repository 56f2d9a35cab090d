/// Reconciliation engine
///
/// Runs the push pass (dirty notes and tombstones to the server) and the pull
/// pass (server notes and tombstones into the local store). Passes are
/// serialized by an in-flight guard; a pass requested while another runs is
/// skipped rather than queued.

use chrono::{DateTime, Utc};
use notesync_core::{InstanceId, LocalNoteStore, RemoteApply};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio::sync::mpsc;

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::metadata::{SyncMetadata, SyncMetadataStore};
use crate::protocol::{DeleteRequest, PushRequest, RemoteEndpoint};
use crate::{Result, SyncError, SyncStats};

/// Sync engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// No pass has run yet
    Idle,
    /// Uploading dirty notes and tombstones
    Pushing,
    /// Fetching and merging server state
    Pulling,
    /// Last pass completed
    Completed,
    /// Last pass failed
    Error(String),
}

/// Sync events that can be observed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    Started {
        instance_id: InstanceId,
    },
    StateChanged {
        old_state: SyncState,
        new_state: SyncState,
    },
    PushCompleted {
        report: PushReport,
    },
    PullCompleted {
        report: PullReport,
    },
    /// A pass was requested while another was running
    Skipped,
    Failed {
        error: String,
    },
}

/// Outcome of a push pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    /// Notes sent to the server
    pub notes_sent: usize,
    /// Notes marked synced after the server accepted them
    pub notes_confirmed: usize,
    /// Accepted notes left dirty because they were edited mid-push
    pub notes_raced: usize,
    /// Notes that failed validation and were not sent
    pub notes_invalid: usize,
    pub tombstones_sent: usize,
    pub tombstones_cleared: usize,
    /// True when no request was needed
    pub empty: bool,
    pub skipped: bool,
}

/// Outcome of a pull pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub notes_received: usize,
    /// Notes written to the local store
    pub notes_applied: usize,
    pub notes_invalid: usize,
    /// Notes left alone because a newer local edit has not been pushed yet
    pub notes_kept_local: usize,
    pub tombstones_received: usize,
    /// Local notes removed because of server tombstones
    pub notes_deleted: usize,
    pub skipped: bool,
}

/// Outcome of a full push-then-pull pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub push: PushReport,
    pub pull: PullReport,
    pub skipped: bool,
    pub duration_ms: u64,
}

/// Clears the in-flight flag when a pass ends, including when it is dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReconciliationEngine {
    store: Arc<LocalNoteStore>,
    remote: Arc<dyn RemoteEndpoint>,
    connectivity: Connectivity,
    config: SyncConfig,
    state: RwLock<SyncState>,
    in_flight: AtomicBool,
    metadata_store: SyncMetadataStore,
    metadata: RwLock<SyncMetadata>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<SyncEvent>>>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<LocalNoteStore>,
        remote: Arc<dyn RemoteEndpoint>,
        connectivity: Connectivity,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate().map_err(SyncError::Config)?;

        let instance_id = store.owner().clone();
        let metadata_store = SyncMetadataStore::new(store.storage().clone(), &instance_id);
        let metadata = metadata_store.load_or_init(&instance_id)?;

        Ok(Self {
            store,
            remote,
            connectivity,
            config,
            state: RwLock::new(SyncState::Idle),
            in_flight: AtomicBool::new(false),
            metadata_store,
            metadata: RwLock::new(metadata),
            event_tx: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<LocalNoteStore> {
        &self.store
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.store.owner()
    }

    /// Get current state
    pub fn get_state(&self) -> SyncState {
        self.state.read().clone()
    }

    /// Get sync statistics
    pub fn get_stats(&self) -> SyncStats {
        self.metadata.read().stats.clone()
    }

    pub fn get_metadata(&self) -> SyncMetadata {
        self.metadata.read().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Subscribe to sync events. A new subscription replaces the previous one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.event_tx.lock() = Some(tx);
        rx
    }

    /// Full pass: push, then pull only if the push succeeded.
    pub async fn sync(&self) -> Result<SyncReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            return Ok(self.skipped_pass());
        };

        let started = Instant::now();
        self.emit_event(SyncEvent::Started {
            instance_id: self.instance_id().clone(),
        });

        let result = async {
            let push = self.push_pass().await?;
            let pull = self.pull_pass(true).await?;
            Ok::<_, SyncError>((push, pull))
        }
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok((push, pull)) => {
                self.set_state(SyncState::Completed);
                self.record_success(duration_ms);
                tracing::info!(
                    instance_id = %self.instance_id(),
                    pushed = push.notes_confirmed,
                    pulled = pull.notes_applied,
                    tombstones_cleared = push.tombstones_cleared,
                    remote_deletions = pull.notes_deleted,
                    duration_ms,
                    "sync pass completed"
                );
                Ok(SyncReport {
                    push,
                    pull,
                    skipped: false,
                    duration_ms,
                })
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Push pass only
    pub async fn sync_outgoing(&self) -> Result<PushReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            self.skipped_pass();
            return Ok(PushReport {
                skipped: true,
                ..PushReport::default()
            });
        };

        let started = Instant::now();
        self.emit_event(SyncEvent::Started {
            instance_id: self.instance_id().clone(),
        });
        match self.push_pass().await {
            Ok(report) => {
                self.set_state(SyncState::Completed);
                self.record_success(started.elapsed().as_millis() as u64);
                Ok(report)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Pull pass only
    pub async fn sync_incoming(&self) -> Result<PullReport> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            self.skipped_pass();
            return Ok(PullReport {
                skipped: true,
                ..PullReport::default()
            });
        };

        let started = Instant::now();
        self.emit_event(SyncEvent::Started {
            instance_id: self.instance_id().clone(),
        });
        match self.pull_pass(false).await {
            Ok(report) => {
                self.set_state(SyncState::Completed);
                self.record_success(started.elapsed().as_millis() as u64);
                Ok(report)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Ask the server to delete one note right away. Returns whether the
    /// server confirmed the deletion.
    pub async fn delete_remote(&self, note_id: &str) -> Result<bool> {
        let instance_id = self.checked_instance_id()?;
        let request = DeleteRequest {
            instance_id,
            note_id: note_id.to_string(),
        };
        let response = self.call(self.remote.delete_one(request)).await?;
        Ok(response.processed)
    }

    async fn push_pass(&self) -> Result<PushReport> {
        self.set_state(SyncState::Pushing);
        let instance_id = self.checked_instance_id()?;

        let dirty = self.store.query_by_sync(false)?;
        let tombstone_ids = self.store.list_tombstones()?;

        let mut report = PushReport::default();
        let mut snapshot: HashMap<String, DateTime<Utc>> = HashMap::with_capacity(dirty.len());
        let mut notes = Vec::with_capacity(dirty.len());
        for note in dirty {
            if let Err(e) = note.validate() {
                tracing::warn!(note_id = %note.id, error = %e, "skipping invalid note");
                report.notes_invalid += 1;
                continue;
            }
            snapshot.insert(note.id.clone(), note.updated_at);
            notes.push(note);
        }

        report.notes_sent = notes.len();
        report.tombstones_sent = tombstone_ids.len();

        if notes.is_empty() && tombstone_ids.is_empty() {
            report.empty = true;
            tracing::debug!("nothing to push");
            self.emit_event(SyncEvent::PushCompleted {
                report: report.clone(),
            });
            return Ok(report);
        }

        let request = PushRequest {
            instance_id,
            notes,
            tombstone_ids: tombstone_ids.clone(),
            rejected: Vec::new(),
        };
        let response = self.call(self.remote.push(request)).await?;

        for accepted in &response.accepted_notes {
            let Some(expected) = snapshot.get(&accepted.id) else {
                tracing::debug!(note_id = %accepted.id, "server accepted a note that was not sent");
                continue;
            };
            if self.store.mark_synced_if_unchanged(&accepted.id, *expected)? {
                report.notes_confirmed += 1;
            } else {
                report.notes_raced += 1;
            }
        }

        if response.tombstones_processed {
            report.tombstones_cleared = self.store.remove_tombstones(&tombstone_ids)?;
        } else if !tombstone_ids.is_empty() {
            tracing::warn!(
                pending = tombstone_ids.len(),
                "server did not confirm tombstones; keeping them"
            );
        }

        {
            let mut metadata = self.metadata.write();
            metadata.stats.notes_pushed += report.notes_confirmed as u64;
            metadata.stats.tombstones_cleared += report.tombstones_cleared as u64;
            metadata.last_push_at = Some(Utc::now());
        }

        tracing::debug!(
            sent = report.notes_sent,
            confirmed = report.notes_confirmed,
            raced = report.notes_raced,
            tombstones_cleared = report.tombstones_cleared,
            "push pass completed"
        );
        self.emit_event(SyncEvent::PushCompleted {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Fetch and merge server state. After a successful push, `keep_unsent`
    /// protects notes edited while that push was in flight.
    async fn pull_pass(&self, keep_unsent: bool) -> Result<PullReport> {
        self.set_state(SyncState::Pulling);
        self.checked_instance_id()?;

        let response = self.call(self.remote.pull(self.instance_id())).await?;

        let mut report = PullReport {
            notes_received: response.notes.len() + response.rejected.len(),
            tombstones_received: response.tombstone_ids.len(),
            ..PullReport::default()
        };

        for rejected in &response.rejected {
            tracing::warn!(
                note_id = rejected.id.as_deref().unwrap_or("<none>"),
                error = %rejected.error,
                "skipping malformed remote note"
            );
            report.notes_invalid += 1;
        }

        for note in response.notes {
            let note_id = note.id.clone();
            let applied = if keep_unsent {
                self.store.merge_remote_note(note)
            } else {
                self.store.apply_remote_note(note).map(|written| {
                    if written {
                        RemoteApply::Written
                    } else {
                        RemoteApply::Unchanged
                    }
                })
            };
            match applied {
                Ok(RemoteApply::Written) => report.notes_applied += 1,
                Ok(RemoteApply::Unchanged) => {}
                Ok(RemoteApply::KeptLocal) => report.notes_kept_local += 1,
                Err(e) if e.is_validation() => {
                    tracing::warn!(note_id = %note_id, error = %e, "skipping invalid remote note");
                    report.notes_invalid += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        for id in &response.tombstone_ids {
            if id.trim().is_empty() {
                tracing::warn!("skipping empty remote tombstone");
                continue;
            }
            if self.store.apply_remote_tombstone(id)? {
                report.notes_deleted += 1;
            }
        }

        {
            let mut metadata = self.metadata.write();
            metadata.stats.notes_pulled += report.notes_applied as u64;
            metadata.stats.remote_deletions_applied += report.notes_deleted as u64;
            metadata.last_pull_at = Some(Utc::now());
        }

        tracing::debug!(
            received = report.notes_received,
            applied = report.notes_applied,
            kept_local = report.notes_kept_local,
            invalid = report.notes_invalid,
            deleted = report.notes_deleted,
            "pull pass completed"
        );
        self.emit_event(SyncEvent::PullCompleted {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Run one remote call, failing fast when offline and bounding it by the
    /// request timeout.
    async fn call<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.config.request_timeout)),
        }
    }

    fn checked_instance_id(&self) -> Result<String> {
        let id = self.instance_id().as_str();
        if id.trim().is_empty() {
            return Err(SyncError::MissingInstanceId);
        }
        Ok(id.to_string())
    }

    fn skipped_pass(&self) -> SyncReport {
        tracing::debug!("sync pass already in flight; skipping");
        self.metadata.write().stats.skipped_syncs += 1;
        self.emit_event(SyncEvent::Skipped);
        SyncReport {
            skipped: true,
            ..SyncReport::default()
        }
    }

    fn record_success(&self, duration_ms: u64) {
        let mut metadata = self.metadata.write();
        let stats = &mut metadata.stats;
        stats.total_syncs += 1;
        stats.successful_syncs += 1;
        stats.last_sync_time = Some(Utc::now().timestamp_millis());
        stats.avg_sync_duration_ms = if stats.successful_syncs == 1 {
            duration_ms
        } else {
            (stats.avg_sync_duration_ms * (stats.successful_syncs - 1) + duration_ms)
                / stats.successful_syncs
        };
        metadata.last_error = None;
        metadata.touch();
        self.persist_metadata(&metadata);
    }

    fn fail(&self, error: &SyncError) {
        tracing::warn!(
            instance_id = %self.instance_id(),
            code = error.code(),
            error = %error,
            "sync pass failed"
        );
        self.set_state(SyncState::Error(error.to_string()));
        {
            let mut metadata = self.metadata.write();
            metadata.stats.total_syncs += 1;
            metadata.stats.failed_syncs += 1;
            metadata.last_error = Some(error.to_string());
            metadata.touch();
            self.persist_metadata(&metadata);
        }
        self.emit_event(SyncEvent::Failed {
            error: error.to_string(),
        });
    }

    fn persist_metadata(&self, metadata: &SyncMetadata) {
        if let Err(e) = self.metadata_store.save_metadata(metadata) {
            tracing::warn!(error = %e, "failed to persist sync metadata");
        }
    }

    fn set_state(&self, new_state: SyncState) {
        let old_state = {
            let mut state = self.state.write();
            let old = state.clone();
            *state = new_state.clone();
            old
        };

        if old_state != new_state {
            self.emit_event(SyncEvent::StateChanged {
                old_state,
                new_state,
            });
        }
    }

    /// Emit an event
    fn emit_event(&self, event: SyncEvent) {
        let mut event_tx = self.event_tx.lock();
        if let Some(tx) = event_tx.as_ref() {
            if tx.send(event).is_err() {
                *event_tx = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRemote;
    use notesync_core::{MemoryStorage, NoteChanges, NoteDraft, NoteSyncState};

    fn engine_with(
        remote: InMemoryRemote,
        connectivity: Connectivity,
    ) -> (Arc<LocalNoteStore>, ReconciliationEngine) {
        let store = Arc::new(LocalNoteStore::new(
            Arc::new(MemoryStorage::new()),
            InstanceId::parse("inst-a").unwrap(),
        ));
        let engine = ReconciliationEngine::new(
            store.clone(),
            Arc::new(remote),
            connectivity,
            SyncConfig::default(),
        )
        .unwrap();
        (store, engine)
    }

    #[tokio::test]
    async fn test_push_marks_notes_synced() {
        let remote = InMemoryRemote::new();
        let (store, engine) = engine_with(remote.clone(), Connectivity::online());
        store.create_note(NoteDraft::new("one").with_id("n1")).unwrap();

        let report = engine.sync_outgoing().await.unwrap();
        assert_eq!(report.notes_sent, 1);
        assert_eq!(report.notes_confirmed, 1);
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::Synced);
        assert!(remote.repository().get("inst-a", "n1").is_some());
    }

    #[tokio::test]
    async fn test_empty_push_makes_no_request() {
        let remote = InMemoryRemote::new();
        let (_, engine) = engine_with(remote.clone(), Connectivity::offline());

        let report = engine.sync_outgoing().await.unwrap();
        assert!(report.empty);
        assert_eq!(remote.push_calls(), 0);
    }

    #[tokio::test]
    async fn test_offline_fails_fast_without_mutation() {
        let remote = InMemoryRemote::new();
        let (store, engine) = engine_with(remote.clone(), Connectivity::offline());
        store.create_note(NoteDraft::new("one").with_id("n1")).unwrap();
        store.record_tombstone("gone").unwrap();

        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Offline));
        assert_eq!(remote.push_calls(), 0);
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::New);
        assert_eq!(store.list_tombstones().unwrap(), vec!["gone".to_string()]);
        assert!(matches!(engine.get_state(), SyncState::Error(_)));
        assert_eq!(engine.get_stats().failed_syncs, 1);
    }

    #[tokio::test]
    async fn test_pull_applies_notes_and_tombstones() {
        let remote = InMemoryRemote::new();
        let (store, engine) = engine_with(remote.clone(), Connectivity::online());

        let mut server_note = store.create_note(NoteDraft::new("srv").with_id("s1")).unwrap();
        store.delete("s1").unwrap();
        server_note.owner_id = "inst-a".to_string();
        remote.repository().upsert("inst-a", server_note);

        store.create_note(NoteDraft::new("doomed").with_id("n2")).unwrap();
        remote
            .repository()
            .push(PushRequest {
                instance_id: "inst-a".to_string(),
                notes: Vec::new(),
                tombstone_ids: vec!["n2".to_string()],
                rejected: Vec::new(),
            })
            .unwrap();

        let report = engine.sync_incoming().await.unwrap();
        assert_eq!(report.notes_applied, 1);
        assert_eq!(report.notes_deleted, 1);
        assert_eq!(store.sync_state("s1").unwrap(), NoteSyncState::Synced);
        assert!(store.get("n2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_full_sync_round_trip_and_events() {
        let remote = InMemoryRemote::new();
        let (store, engine) = engine_with(remote.clone(), Connectivity::online());
        let mut events = engine.subscribe();

        store.create_note(NoteDraft::new("one").with_id("n1")).unwrap();
        store.update_note("n1", NoteChanges::body("text")).unwrap();

        let report = engine.sync().await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.push.notes_confirmed, 1);
        assert_eq!(engine.get_state(), SyncState::Completed);
        assert_eq!(engine.get_stats().successful_syncs, 1);

        let mut saw_push = false;
        let mut saw_pull = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SyncEvent::PushCompleted { .. } => saw_push = true,
                SyncEvent::PullCompleted { .. } => saw_pull = true,
                _ => {}
            }
        }
        assert!(saw_push && saw_pull);
    }

    #[tokio::test]
    async fn test_stats_survive_engine_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let instance = InstanceId::parse("inst-a").unwrap();
        let remote: Arc<dyn RemoteEndpoint> = Arc::new(InMemoryRemote::new());

        let store = Arc::new(LocalNoteStore::new(storage.clone(), instance.clone()));
        let engine = ReconciliationEngine::new(
            store,
            remote.clone(),
            Connectivity::online(),
            SyncConfig::default(),
        )
        .unwrap();
        engine.sync().await.unwrap();
        drop(engine);

        let store = Arc::new(LocalNoteStore::new(storage, instance));
        let engine =
            ReconciliationEngine::new(store, remote, Connectivity::online(), SyncConfig::default())
                .unwrap();
        assert_eq!(engine.get_stats().successful_syncs, 1);
        assert!(engine.get_metadata().last_pull_at.is_some());
    }

    /// Serves a fixed pull body after a delay
    struct CannedPull {
        body: &'static str,
        latency: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl RemoteEndpoint for CannedPull {
        async fn push(&self, request: PushRequest) -> Result<crate::PushResponse> {
            Ok(crate::PushResponse {
                accepted_notes: request.notes,
                tombstones_processed: true,
            })
        }

        async fn pull(&self, _instance_id: &InstanceId) -> Result<crate::PullResponse> {
            tokio::time::sleep(self.latency).await;
            serde_json::from_str(self.body).map_err(|e| SyncError::InvalidResponse(e.to_string()))
        }

        async fn delete_one(&self, _request: DeleteRequest) -> Result<crate::DeleteResponse> {
            Ok(crate::DeleteResponse { processed: true })
        }

        fn describe(&self) -> String {
            "canned".to_string()
        }
    }

    fn engine_over(remote: CannedPull) -> (Arc<LocalNoteStore>, ReconciliationEngine) {
        let store = Arc::new(LocalNoteStore::new(
            Arc::new(MemoryStorage::new()),
            InstanceId::parse("inst-a").unwrap(),
        ));
        let engine = ReconciliationEngine::new(
            store.clone(),
            Arc::new(remote),
            Connectivity::online(),
            SyncConfig::default(),
        )
        .unwrap();
        (store, engine)
    }

    #[tokio::test]
    async fn test_pull_skips_malformed_records_and_applies_the_rest() {
        let (store, engine) = engine_over(CannedPull {
            body: r#"{
                "notes": [
                    {"id": "good", "title": "kept"},
                    {"id": "bad", "updatedAt": "not-a-date"},
                    {"id": "tags", "tags": {"not": "a list"}},
                    {"id": "also-good"}
                ],
                "tombstoneIds": []
            }"#,
            latency: std::time::Duration::ZERO,
        });

        let report = engine.sync_incoming().await.unwrap();
        assert_eq!(report.notes_received, 4);
        assert_eq!(report.notes_applied, 2);
        assert_eq!(report.notes_invalid, 2);
        assert_eq!(store.get("good").unwrap().unwrap().title, "kept");
        assert!(store.get("also-good").unwrap().is_some());
        assert!(store.get("bad").unwrap().is_none());
        assert_eq!(engine.get_stats().successful_syncs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_pass_durations_feed_the_average() {
        let (_, engine) = engine_over(CannedPull {
            body: r#"{"notes":[],"tombstoneIds":[]}"#,
            latency: std::time::Duration::from_millis(400),
        });

        engine.sync_incoming().await.unwrap();
        assert!(engine.get_stats().avg_sync_duration_ms >= 400);

        engine.sync_incoming().await.unwrap();
        assert!(engine.get_stats().avg_sync_duration_ms >= 400);
        assert_eq!(engine.get_stats().successful_syncs, 2);
    }

    #[tokio::test]
    async fn test_in_flight_guard_releases_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let guard = InFlightGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(InFlightGuard::acquire(&flag).is_none());
        }
        assert!(InFlightGuard::acquire(&flag).is_some());
    }
}
