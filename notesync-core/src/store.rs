/// Local note store
///
/// Durable, keyed storage of note records for one instance, plus the tombstone
/// log of deletions the server has not confirmed yet. Each public call is one
/// transaction scope: a store-wide write lock serializes read-check-write
/// sequences, and every call ends in at most one atomic storage commit.

use crate::retry::{retry_with_policy, RetryPolicy};
use crate::storage::{Keyspace, Storage, WriteBatch};
use crate::types::{now_millis, InstanceId, Note, NoteChanges, NoteDraft, NoteSyncState};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Note record plus local bookkeeping that never goes on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredNote {
    #[serde(flatten)]
    note: Note,
    #[serde(default)]
    last_confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TombstoneEntry {
    recorded_at: DateTime<Utc>,
}

/// A pending deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Counts used by status displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub notes: usize,
    pub unsynced: usize,
    pub tombstones: usize,
}

/// What happened to a note fetched from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    Written,
    /// Local copy already matched
    Unchanged,
    /// A pending local delete or a newer unsent edit took precedence
    KeptLocal,
}

pub struct LocalNoteStore {
    storage: Arc<dyn Storage>,
    owner: InstanceId,
    write_lock: Mutex<()>,
    commit_retry: RetryPolicy,
}

impl LocalNoteStore {
    pub fn new(storage: Arc<dyn Storage>, owner: InstanceId) -> Self {
        Self {
            storage,
            owner,
            write_lock: Mutex::new(()),
            commit_retry: RetryPolicy::fast(),
        }
    }

    /// Set the retry policy for commits that fail transiently
    pub fn with_commit_retry(mut self, policy: RetryPolicy) -> Self {
        self.commit_retry = policy;
        self
    }

    /// Instance this store is partitioned by
    pub fn owner(&self) -> &InstanceId {
        &self.owner
    }

    /// Underlying storage, shared with other per-instance bookkeeping
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Insert or overwrite a note by id.
    ///
    /// Returns false without committing when the stored record is identical.
    /// Putting a note also drops any pending tombstone for its id.
    pub fn put(&self, note: Note) -> Result<bool> {
        let note = self.normalize(note)?;
        let _guard = self.write_lock.lock();

        let existing = self.load_stored(&note.id)?;
        if let Some(existing) = &existing {
            if existing.note == note {
                return Ok(false);
            }
        }

        let stored = StoredNote {
            last_confirmed_at: existing.and_then(|s| s.last_confirmed_at),
            note,
        };

        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Notes, stored.note.id.clone(), encode(&stored)?);
        if self.has_tombstone(&stored.note.id)? {
            batch.delete(Keyspace::Tombstones, stored.note.id.clone());
        }
        self.commit(batch)?;

        tracing::debug!(note_id = %stored.note.id, synced = stored.note.synced, "put note");
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.load_stored(id)?.map(|s| s.note))
    }

    /// All notes, ordered by id
    pub fn get_all(&self) -> Result<Vec<Note>> {
        self.storage
            .scan(Keyspace::Notes)?
            .into_iter()
            .map(|(key, value)| decode::<StoredNote>(&key, &value).map(|s| s.note))
            .collect()
    }

    /// Notes whose `synced` flag equals `synced`
    pub fn query_by_sync(&self, synced: bool) -> Result<Vec<Note>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|n| n.synced == synced)
            .collect())
    }

    /// Delete a note. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        if self.load_stored(id)?.is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        batch.delete(Keyspace::Notes, id);
        self.commit(batch)?;

        tracing::debug!(note_id = %id, "deleted note");
        Ok(true)
    }

    /// Record a pending deletion. Idempotent; the first recording time is kept.
    pub fn record_tombstone(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let _guard = self.write_lock.lock();
        if self.has_tombstone(id)? {
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Tombstones, id, tombstone_value()?);
        self.commit(batch)
    }

    /// Pending tombstone ids, ordered by id
    pub fn list_tombstones(&self) -> Result<Vec<String>> {
        Ok(self
            .storage
            .scan(Keyspace::Tombstones)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Pending tombstones with their recording times
    pub fn tombstones(&self) -> Result<Vec<Tombstone>> {
        self.storage
            .scan(Keyspace::Tombstones)?
            .into_iter()
            .map(|(key, value)| {
                let entry: TombstoneEntry = decode(&key, &value)?;
                Ok(Tombstone {
                    id: key,
                    recorded_at: entry.recorded_at,
                })
            })
            .collect()
    }

    /// Remove every pending tombstone. Returns how many were removed.
    pub fn clear_tombstones(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::new();
        for id in self.list_tombstones()? {
            batch.delete(Keyspace::Tombstones, id);
        }
        let removed = batch.len();
        self.commit(batch)?;
        Ok(removed)
    }

    /// Remove the given tombstones, leaving any others pending.
    pub fn remove_tombstones(&self, ids: &[String]) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::new();
        for id in ids {
            if self.has_tombstone(id)? {
                batch.delete(Keyspace::Tombstones, id.clone());
            }
        }
        let removed = batch.len();
        self.commit(batch)?;
        Ok(removed)
    }

    /// Delete a note and record its tombstone in one commit.
    ///
    /// Deleting an id with no local note still records the tombstone so the
    /// server copy is removed on the next push.
    pub fn delete_with_tombstone(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let _guard = self.write_lock.lock();

        let mut batch = WriteBatch::new();
        if self.load_stored(id)?.is_some() {
            batch.delete(Keyspace::Notes, id);
        }
        if !self.has_tombstone(id)? {
            batch.put(Keyspace::Tombstones, id, tombstone_value()?);
        }
        self.commit(batch)?;

        tracing::debug!(note_id = %id, "deleted note pending server confirmation");
        Ok(())
    }

    /// Flip `synced` to true if the note still has the given `updatedAt`.
    ///
    /// Returns false when the note is gone, already synced, or was edited after
    /// `expected_updated_at` was read.
    pub fn mark_synced_if_unchanged(
        &self,
        id: &str,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut stored = match self.load_stored(id)? {
            Some(stored) => stored,
            None => return Ok(false),
        };

        if stored.note.synced || stored.note.updated_at != expected_updated_at {
            tracing::debug!(
                note_id = %id,
                expected = %expected_updated_at,
                actual = %stored.note.updated_at,
                "note changed during push; leaving dirty"
            );
            return Ok(false);
        }

        stored.note.synced = true;
        stored.last_confirmed_at = Some(now_millis());

        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Notes, id, encode(&stored)?);
        self.commit(batch)?;
        Ok(true)
    }

    /// Materialize a note fetched from the server.
    ///
    /// The server copy overwrites local edits. Ids with a pending local
    /// tombstone are left deleted. Returns whether anything was written.
    pub fn apply_remote_note(&self, note: Note) -> Result<bool> {
        Ok(self.apply_remote(note, false)? == RemoteApply::Written)
    }

    /// Like [`apply_remote_note`](Self::apply_remote_note), but an unsent local
    /// edit newer than the server copy is kept.
    ///
    /// Used by the pull that follows a successful push: a note still dirty at
    /// that point was edited after the push read it, and the server has not
    /// seen that edit yet.
    pub fn merge_remote_note(&self, note: Note) -> Result<RemoteApply> {
        self.apply_remote(note, true)
    }

    fn apply_remote(&self, note: Note, keep_newer_local: bool) -> Result<RemoteApply> {
        validate_id(&note.id)?;
        let mut note = note;
        note.owner_id = self.owner.as_str().to_string();
        note.synced = true;

        let _guard = self.write_lock.lock();
        if self.has_tombstone(&note.id)? {
            tracing::debug!(note_id = %note.id, "skipping remote note with pending local delete");
            return Ok(RemoteApply::KeptLocal);
        }

        if let Some(existing) = self.load_stored(&note.id)? {
            if existing.note == note && existing.last_confirmed_at.is_some() {
                return Ok(RemoteApply::Unchanged);
            }
            if keep_newer_local
                && !existing.note.synced
                && existing.note.updated_at > note.updated_at
            {
                tracing::debug!(
                    note_id = %note.id,
                    local = %existing.note.updated_at,
                    remote = %note.updated_at,
                    "keeping unsent local edit over older server copy"
                );
                return Ok(RemoteApply::KeptLocal);
            }
        }

        let stored = StoredNote {
            note,
            last_confirmed_at: Some(now_millis()),
        };
        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Notes, stored.note.id.clone(), encode(&stored)?);
        self.commit(batch)?;
        Ok(RemoteApply::Written)
    }

    /// Apply a server-side deletion. Returns whether a local note was removed.
    pub fn apply_remote_tombstone(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        let removed = self.delete(id)?;
        if removed {
            tracing::debug!(note_id = %id, "applied remote deletion");
        }
        Ok(removed)
    }

    pub fn sync_state(&self, id: &str) -> Result<NoteSyncState> {
        if let Some(stored) = self.load_stored(id)? {
            let state = match (stored.note.synced, stored.last_confirmed_at) {
                (true, _) => NoteSyncState::Synced,
                (false, Some(_)) => NoteSyncState::Dirty,
                (false, None) => NoteSyncState::New,
            };
            return Ok(state);
        }

        if self.has_tombstone(id)? {
            Ok(NoteSyncState::Tombstoned)
        } else {
            Ok(NoteSyncState::Absent)
        }
    }

    /// Create a new unsynced note owned by this instance.
    pub fn create_note(&self, draft: NoteDraft) -> Result<Note> {
        let note = Note::from_draft(draft, &self.owner);
        note.validate()?;

        let _guard = self.write_lock.lock();
        if self.load_stored(&note.id)?.is_some() {
            return Err(Error::InvalidNote(format!("note {} already exists", note.id)));
        }

        let stored = StoredNote {
            note,
            last_confirmed_at: None,
        };
        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Notes, stored.note.id.clone(), encode(&stored)?);
        if self.has_tombstone(&stored.note.id)? {
            batch.delete(Keyspace::Tombstones, stored.note.id.clone());
        }
        self.commit(batch)?;

        tracing::debug!(note_id = %stored.note.id, "created note");
        Ok(stored.note)
    }

    /// Apply local edits to an existing note.
    pub fn update_note(&self, id: &str, changes: NoteChanges) -> Result<Note> {
        let _guard = self.write_lock.lock();
        let mut stored = self
            .load_stored(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !stored.note.apply_changes(changes) {
            return Ok(stored.note);
        }

        let mut batch = WriteBatch::new();
        batch.put(Keyspace::Notes, id, encode(&stored)?);
        self.commit(batch)?;

        tracing::debug!(note_id = %id, updated_at = %stored.note.updated_at, "updated note");
        Ok(stored.note)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let notes = self.get_all()?;
        Ok(StoreStats {
            unsynced: notes.iter().filter(|n| !n.synced).count(),
            notes: notes.len(),
            tombstones: self.list_tombstones()?.len(),
        })
    }

    fn normalize(&self, mut note: Note) -> Result<Note> {
        note.validate()?;
        if note.owner_id.is_empty() {
            note.owner_id = self.owner.as_str().to_string();
        } else if note.owner_id != self.owner.as_str() {
            return Err(Error::InvalidNote(format!(
                "note {} belongs to {}, not {}",
                note.id, note.owner_id, self.owner
            )));
        }
        Ok(note)
    }

    fn load_stored(&self, id: &str) -> Result<Option<StoredNote>> {
        match self.storage.get(Keyspace::Notes, id)? {
            Some(value) => decode(id, &value).map(Some),
            None => Ok(None),
        }
    }

    fn has_tombstone(&self, id: &str) -> Result<bool> {
        Ok(self.storage.get(Keyspace::Tombstones, id)?.is_some())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        retry_with_policy(&self.commit_retry, || self.storage.commit(batch.clone()))
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidNote("note id is missing".to_string()));
    }
    Ok(())
}

fn tombstone_value() -> Result<Vec<u8>> {
    encode(&TombstoneEntry {
        recorded_at: now_millis(),
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(key: &str, value: &[u8]) -> Result<T> {
    serde_json::from_slice(value)
        .map_err(|e| Error::Corruption(format!("undecodable record {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, LocalNoteStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = LocalNoteStore::new(storage.clone(), InstanceId::parse("inst-a").unwrap());
        (storage, store)
    }

    fn draft(id: &str) -> NoteDraft {
        NoteDraft::new(format!("title {}", id)).with_id(id)
    }

    #[test]
    fn test_create_and_get() {
        let (_, store) = store();
        let note = store.create_note(draft("n1").with_body("hello")).unwrap();

        let loaded = store.get("n1").unwrap().unwrap();
        assert_eq!(loaded, note);
        assert!(!loaded.synced);
        assert_eq!(loaded.owner_id, "inst-a");
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::New);
    }

    #[test]
    fn test_create_duplicate_id_rejected() {
        let (_, store) = store();
        store.create_note(draft("n1")).unwrap();
        let err = store.create_note(draft("n1")).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_put_identical_is_noop() {
        let (storage, store) = store();
        let note = store.create_note(draft("n1")).unwrap();
        let commits = storage.commit_count();

        assert!(!store.put(note.clone()).unwrap());
        assert_eq!(storage.commit_count(), commits);

        let mut changed = note;
        changed.title = "other".to_string();
        assert!(store.put(changed).unwrap());
        assert_eq!(storage.commit_count(), commits + 1);
    }

    #[test]
    fn test_put_rejects_missing_id_and_foreign_owner() {
        let (_, store) = store();
        let mut note = store.create_note(draft("n1")).unwrap();

        note.id = String::new();
        assert!(matches!(store.put(note.clone()), Err(Error::InvalidNote(_))));

        note.id = "n2".to_string();
        note.owner_id = "inst-b".to_string();
        assert!(matches!(store.put(note.clone()), Err(Error::InvalidNote(_))));

        note.owner_id = String::new();
        assert!(store.put(note).unwrap());
        assert_eq!(store.get("n2").unwrap().unwrap().owner_id, "inst-a");
    }

    #[test]
    fn test_query_by_sync() {
        let (_, store) = store();
        let n1 = store.create_note(draft("n1")).unwrap();
        store.create_note(draft("n2")).unwrap();
        assert!(store.mark_synced_if_unchanged("n1", n1.updated_at).unwrap());

        let synced: Vec<String> = store.query_by_sync(true).unwrap().into_iter().map(|n| n.id).collect();
        let dirty: Vec<String> = store.query_by_sync(false).unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(synced, vec!["n1".to_string()]);
        assert_eq!(dirty, vec!["n2".to_string()]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_, store) = store();
        store.create_note(draft("n1")).unwrap();
        assert!(store.delete("n1").unwrap());
        assert!(!store.delete("n1").unwrap());
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::Absent);
    }

    #[test]
    fn test_tombstone_lifecycle() {
        let (_, store) = store();
        store.record_tombstone("a").unwrap();
        store.record_tombstone("b").unwrap();
        store.record_tombstone("a").unwrap();
        assert_eq!(store.list_tombstones().unwrap(), vec!["a".to_string(), "b".to_string()]);

        assert_eq!(store.remove_tombstones(&["a".to_string(), "zzz".to_string()]).unwrap(), 1);
        assert_eq!(store.list_tombstones().unwrap(), vec!["b".to_string()]);

        assert_eq!(store.clear_tombstones().unwrap(), 1);
        assert!(store.list_tombstones().unwrap().is_empty());
        assert_eq!(store.clear_tombstones().unwrap(), 0);
    }

    #[test]
    fn test_record_tombstone_keeps_first_time() {
        let (storage, store) = store();
        store.record_tombstone("a").unwrap();
        let first = store.tombstones().unwrap()[0].recorded_at;
        let commits = storage.commit_count();

        store.record_tombstone("a").unwrap();
        assert_eq!(storage.commit_count(), commits);
        assert_eq!(store.tombstones().unwrap()[0].recorded_at, first);
    }

    #[test]
    fn test_delete_with_tombstone() {
        let (storage, store) = store();
        store.create_note(draft("n1")).unwrap();
        let commits = storage.commit_count();

        store.delete_with_tombstone("n1").unwrap();
        assert_eq!(storage.commit_count(), commits + 1);
        assert!(store.get("n1").unwrap().is_none());
        assert_eq!(store.list_tombstones().unwrap(), vec!["n1".to_string()]);
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::Tombstoned);
    }

    #[test]
    fn test_recreate_clears_tombstone() {
        let (_, store) = store();
        store.create_note(draft("n1")).unwrap();
        store.delete_with_tombstone("n1").unwrap();

        store.create_note(draft("n1")).unwrap();
        assert!(store.list_tombstones().unwrap().is_empty());
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::New);
    }

    #[test]
    fn test_mark_synced_detects_concurrent_edit() {
        let (_, store) = store();
        let note = store.create_note(draft("n1")).unwrap();
        let snapshot = note.updated_at;

        let edited = store.update_note("n1", NoteChanges::title("newer")).unwrap();
        assert!(edited.updated_at > snapshot);

        assert!(!store.mark_synced_if_unchanged("n1", snapshot).unwrap());
        assert!(!store.get("n1").unwrap().unwrap().synced);

        assert!(store.mark_synced_if_unchanged("n1", edited.updated_at).unwrap());
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::Synced);
        assert!(!store.mark_synced_if_unchanged("n1", edited.updated_at).unwrap());
        assert!(!store.mark_synced_if_unchanged("missing", edited.updated_at).unwrap());
    }

    #[test]
    fn test_state_machine_new_synced_dirty() {
        let (_, store) = store();
        let note = store.create_note(draft("n1")).unwrap();
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::New);

        store.mark_synced_if_unchanged("n1", note.updated_at).unwrap();
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::Synced);

        store.update_note("n1", NoteChanges::body("edit")).unwrap();
        assert_eq!(store.sync_state("n1").unwrap(), NoteSyncState::Dirty);
    }

    #[test]
    fn test_update_missing_note() {
        let (_, store) = store();
        let err = store.update_note("nope", NoteChanges::title("x")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_update_without_changes_keeps_sync_flag() {
        let (storage, store) = store();
        let note = store.create_note(draft("n1")).unwrap();
        store.mark_synced_if_unchanged("n1", note.updated_at).unwrap();
        let commits = storage.commit_count();

        let same = store.update_note("n1", NoteChanges::default()).unwrap();
        assert!(same.synced);
        assert_eq!(storage.commit_count(), commits);
    }

    #[test]
    fn test_apply_remote_note_overwrites_and_is_idempotent() {
        let (storage, store) = store();
        store.create_note(draft("n1").with_body("local")).unwrap();

        let mut remote = store.get("n1").unwrap().unwrap();
        remote.body = "server".to_string();
        remote.synced = false;
        remote.owner_id = "whatever".to_string();

        assert!(store.apply_remote_note(remote.clone()).unwrap());
        let local = store.get("n1").unwrap().unwrap();
        assert_eq!(local.body, "server");
        assert!(local.synced);
        assert_eq!(local.owner_id, "inst-a");

        let commits = storage.commit_count();
        assert!(!store.apply_remote_note(remote).unwrap());
        assert_eq!(storage.commit_count(), commits);
    }

    #[test]
    fn test_apply_remote_note_respects_pending_delete() {
        let (_, store) = store();
        let note = store.create_note(draft("n1")).unwrap();
        store.delete_with_tombstone("n1").unwrap();

        assert!(!store.apply_remote_note(note).unwrap());
        assert!(store.get("n1").unwrap().is_none());
    }

    #[test]
    fn test_merge_remote_note_keeps_newer_unsent_edit() {
        let (_, store) = store();
        let sent = store.create_note(draft("n1").with_body("sent")).unwrap();
        store.update_note("n1", NoteChanges::body("newer")).unwrap();

        assert_eq!(store.merge_remote_note(sent.clone()).unwrap(), RemoteApply::KeptLocal);
        let local = store.get("n1").unwrap().unwrap();
        assert_eq!(local.body, "newer");
        assert!(!local.synced);

        // Plain apply still lets the server win
        assert!(store.apply_remote_note(sent).unwrap());
        assert_eq!(store.get("n1").unwrap().unwrap().body, "sent");
    }

    #[test]
    fn test_merge_remote_note_overwrites_synced_copy() {
        let (_, store) = store();
        let note = store.create_note(draft("n1")).unwrap();
        store.mark_synced_if_unchanged("n1", note.updated_at).unwrap();

        let mut remote = note.clone();
        remote.body = "from another device".to_string();
        remote.updated_at = note.updated_at + chrono::Duration::seconds(1);
        assert_eq!(store.merge_remote_note(remote.clone()).unwrap(), RemoteApply::Written);
        assert_eq!(store.merge_remote_note(remote).unwrap(), RemoteApply::Unchanged);
        assert_eq!(store.get("n1").unwrap().unwrap().body, "from another device");
    }

    #[test]
    fn test_apply_remote_tombstone_deletes_dirty_note() {
        let (_, store) = store();
        store.create_note(draft("n2")).unwrap();
        assert!(store.apply_remote_tombstone("n2").unwrap());
        assert!(store.get("n2").unwrap().is_none());
        assert!(!store.apply_remote_tombstone("n2").unwrap());
    }

    #[test]
    fn test_stats() {
        let (_, store) = store();
        let n1 = store.create_note(draft("n1")).unwrap();
        store.create_note(draft("n2")).unwrap();
        store.mark_synced_if_unchanged("n1", n1.updated_at).unwrap();
        store.record_tombstone("n3").unwrap();

        assert_eq!(
            store.stats().unwrap(),
            StoreStats {
                notes: 2,
                unsynced: 1,
                tombstones: 1
            }
        );
    }
}
