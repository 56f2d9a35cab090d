/// In-memory remote repository
///
/// Server-side note storage partitioned by instance id. The reference server
/// wraps it behind HTTP routes; `InMemoryRemote` exposes it directly as a
/// `RemoteEndpoint` for tests and offline demos.

use async_trait::async_trait;
use notesync_core::{InstanceId, Note};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::protocol::{
    DeleteRequest, DeleteResponse, PullResponse, PushRequest, PushResponse, RemoteEndpoint,
};
use crate::{Result, SyncError};

#[derive(Debug, Default)]
struct Partition {
    notes: BTreeMap<String, Note>,
    tombstones: BTreeSet<String>,
}

/// Notes and server tombstones for every instance id
#[derive(Debug, Default)]
pub struct RemoteRepository {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl RemoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a push: tombstoned ids are deleted first, then every note with an
    /// id is upserted, so a note re-created after deletion survives.
    pub fn push(&self, request: PushRequest) -> Result<PushResponse> {
        let instance_id = require_instance_id(&request.instance_id)?;
        let mut partitions = self.partitions.write();
        let partition = partitions.entry(instance_id.to_string()).or_default();

        for id in request.tombstone_ids {
            if id.trim().is_empty() {
                continue;
            }
            partition.notes.remove(&id);
            partition.tombstones.insert(id);
        }

        let mut accepted = Vec::with_capacity(request.notes.len());
        for mut note in request.notes {
            if note.id.trim().is_empty() {
                tracing::warn!(instance_id, "skipping pushed note without id");
                continue;
            }
            note.owner_id = instance_id.to_string();
            note.synced = true;
            partition.tombstones.remove(&note.id);
            partition.notes.insert(note.id.clone(), note.clone());
            accepted.push(note);
        }

        tracing::debug!(
            instance_id,
            accepted = accepted.len(),
            notes = partition.notes.len(),
            "applied push"
        );

        Ok(PushResponse {
            accepted_notes: accepted,
            tombstones_processed: true,
        })
    }

    /// Full note and tombstone set of a partition
    pub fn pull(&self, instance_id: &str) -> Result<PullResponse> {
        let instance_id = require_instance_id(instance_id)?;
        let partitions = self.partitions.read();
        Ok(match partitions.get(instance_id) {
            Some(partition) => PullResponse {
                notes: partition.notes.values().cloned().collect(),
                tombstone_ids: partition.tombstones.iter().cloned().collect(),
                rejected: Vec::new(),
            },
            None => PullResponse::default(),
        })
    }

    pub fn delete_one(&self, request: DeleteRequest) -> Result<DeleteResponse> {
        let instance_id = require_instance_id(&request.instance_id)?;
        if request.note_id.trim().is_empty() {
            return Ok(DeleteResponse { processed: false });
        }

        let mut partitions = self.partitions.write();
        let partition = partitions.entry(instance_id.to_string()).or_default();
        partition.notes.remove(&request.note_id);
        partition.tombstones.insert(request.note_id);
        Ok(DeleteResponse { processed: true })
    }

    pub fn get(&self, instance_id: &str, note_id: &str) -> Option<Note> {
        self.partitions
            .read()
            .get(instance_id)
            .and_then(|p| p.notes.get(note_id).cloned())
    }

    pub fn note_count(&self, instance_id: &str) -> usize {
        self.partitions
            .read()
            .get(instance_id)
            .map(|p| p.notes.len())
            .unwrap_or(0)
    }

    pub fn tombstone_ids(&self, instance_id: &str) -> Vec<String> {
        self.partitions
            .read()
            .get(instance_id)
            .map(|p| p.tombstones.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace or insert a note directly, as another device's push would.
    pub fn upsert(&self, instance_id: &str, note: Note) {
        let mut partitions = self.partitions.write();
        let partition = partitions.entry(instance_id.to_string()).or_default();
        partition.tombstones.remove(&note.id);
        partition.notes.insert(note.id.clone(), note);
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }
}

fn require_instance_id(instance_id: &str) -> Result<&str> {
    let trimmed = instance_id.trim();
    if trimmed.is_empty() {
        return Err(SyncError::MissingInstanceId);
    }
    Ok(trimmed)
}

/// `RemoteEndpoint` backed directly by a shared `RemoteRepository`
#[derive(Clone, Default)]
pub struct InMemoryRemote {
    repository: Arc<RemoteRepository>,
    calls: Arc<CallCounts>,
}

#[derive(Debug, Default)]
struct CallCounts {
    push: AtomicUsize,
    pull: AtomicUsize,
    delete: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(repository: Arc<RemoteRepository>) -> Self {
        Self {
            repository,
            calls: Arc::default(),
        }
    }

    pub fn repository(&self) -> &Arc<RemoteRepository> {
        &self.repository
    }

    pub fn push_calls(&self) -> usize {
        self.calls.push.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.calls.pull.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteEndpoint for InMemoryRemote {
    async fn push(&self, request: PushRequest) -> Result<PushResponse> {
        self.calls.push.fetch_add(1, Ordering::SeqCst);
        self.repository.push(request)
    }

    async fn pull(&self, instance_id: &InstanceId) -> Result<PullResponse> {
        self.calls.pull.fetch_add(1, Ordering::SeqCst);
        self.repository.pull(instance_id.as_str())
    }

    async fn delete_one(&self, request: DeleteRequest) -> Result<DeleteResponse> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.repository.delete_one(request)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::NoteDraft;

    fn note(id: &str) -> Note {
        let mut note = Note::from_draft(
            NoteDraft::new(id).with_id(id),
            &InstanceId::parse("client").unwrap(),
        );
        note.owner_id = String::new();
        note
    }

    fn push(instance: &str, notes: Vec<Note>, tombstones: &[&str]) -> PushRequest {
        PushRequest {
            instance_id: instance.to_string(),
            notes,
            tombstone_ids: tombstones.iter().map(|s| s.to_string()).collect(),
            rejected: Vec::new(),
        }
    }

    #[test]
    fn test_push_upserts_and_stamps_owner() {
        let repo = RemoteRepository::new();
        let response = repo.push(push("a", vec![note("n1")], &[])).unwrap();

        assert_eq!(response.accepted_notes.len(), 1);
        assert!(response.accepted_notes[0].synced);
        assert!(response.tombstones_processed);

        let stored = repo.get("a", "n1").unwrap();
        assert_eq!(stored.owner_id, "a");
        assert!(stored.synced);
    }

    #[test]
    fn test_push_skips_notes_without_id() {
        let repo = RemoteRepository::new();
        let mut orphan = note("x");
        orphan.id = String::new();

        let response = repo.push(push("a", vec![orphan, note("n1")], &[])).unwrap();
        assert_eq!(response.accepted_notes.len(), 1);
        assert_eq!(repo.note_count("a"), 1);
    }

    #[test]
    fn test_tombstones_delete_and_are_recorded() {
        let repo = RemoteRepository::new();
        repo.push(push("a", vec![note("n1"), note("n2")], &[])).unwrap();
        repo.push(push("a", vec![], &["n1"])).unwrap();

        assert!(repo.get("a", "n1").is_none());
        assert_eq!(repo.tombstone_ids("a"), vec!["n1".to_string()]);

        let pulled = repo.pull("a").unwrap();
        assert_eq!(pulled.notes.len(), 1);
        assert_eq!(pulled.tombstone_ids, vec!["n1".to_string()]);
    }

    #[test]
    fn test_recreate_after_tombstone_wins() {
        let repo = RemoteRepository::new();
        repo.push(push("a", vec![note("n1")], &["n1"])).unwrap();
        assert!(repo.get("a", "n1").is_some());
        assert!(repo.tombstone_ids("a").is_empty());

        repo.push(push("a", vec![], &["n1"])).unwrap();
        repo.push(push("a", vec![note("n1")], &[])).unwrap();
        assert!(repo.get("a", "n1").is_some());
        assert!(repo.tombstone_ids("a").is_empty());
    }

    #[test]
    fn test_missing_instance_id_rejected() {
        let repo = RemoteRepository::new();
        assert!(matches!(
            repo.push(push(" ", vec![note("n1")], &[])),
            Err(SyncError::MissingInstanceId)
        ));
        assert!(repo.pull("").is_err());
        assert_eq!(repo.partition_count(), 0);
    }

    #[test]
    fn test_partitions_are_isolated() {
        let repo = RemoteRepository::new();
        repo.push(push("a", vec![note("n1")], &[])).unwrap();
        repo.push(push("b", vec![note("n2")], &["n1"])).unwrap();

        assert!(repo.get("a", "n1").is_some());
        assert!(repo.tombstone_ids("a").is_empty());
        let b = repo.pull("b").unwrap();
        assert_eq!(b.notes.len(), 1);
        assert_eq!(b.notes[0].id, "n2");
    }

    #[test]
    fn test_delete_one() {
        let repo = RemoteRepository::new();
        repo.push(push("a", vec![note("n1")], &[])).unwrap();

        let request = DeleteRequest {
            instance_id: "a".to_string(),
            note_id: "n1".to_string(),
        };
        assert!(repo.delete_one(request).unwrap().processed);
        assert!(repo.get("a", "n1").is_none());
        assert_eq!(repo.tombstone_ids("a"), vec!["n1".to_string()]);

        let empty = DeleteRequest {
            instance_id: "a".to_string(),
            note_id: String::new(),
        };
        assert!(!repo.delete_one(empty).unwrap().processed);
    }

    #[tokio::test]
    async fn test_in_memory_remote_counts_calls() {
        let remote = InMemoryRemote::new();
        let instance = InstanceId::parse("a").unwrap();

        remote.push(push("a", vec![note("n1")], &[])).await.unwrap();
        let pulled = remote.pull(&instance).await.unwrap();

        assert_eq!(pulled.notes.len(), 1);
        assert_eq!(remote.push_calls(), 1);
        assert_eq!(remote.pull_calls(), 1);
        assert_eq!(remote.delete_calls(), 0);
    }
}
