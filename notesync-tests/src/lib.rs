/// Test utilities and helpers for NoteSync testing
///
/// Fault-injecting storage and remote wrappers plus session helpers shared by
/// the end-to-end tests in `tests/`.

use async_trait::async_trait;
use notesync_core::{
    BatchOp, Error as CoreError, InstanceId, Keyspace, LocalNoteStore, MemoryStorage, Storage, WriteBatch,
};
use notesync_sync::{
    Connectivity, DeleteRequest, DeleteResponse, InMemoryRemote, NoteSession, PullResponse,
    PushRequest, PushResponse, RemoteEndpoint, RemoteRepository, SyncConfig, SyncError,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How an injected commit failure presents itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFailure {
    /// `StorageBusy`, retried by the store
    Busy,
    /// `Internal`, surfaced immediately
    Hard,
}

/// Storage wrapper that fails a chosen number of upcoming commits
pub struct FlakyStorage {
    inner: Arc<dyn Storage>,
    pending_failures: AtomicUsize,
    failure: Mutex<CommitFailure>,
    attempts: AtomicUsize,
    failed: AtomicUsize,
    note_commits: AtomicUsize,
}

impl FlakyStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            pending_failures: AtomicUsize::new(0),
            failure: Mutex::new(CommitFailure::Hard),
            attempts: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            note_commits: AtomicUsize::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Fail the next `count` commits with the given failure
    pub fn fail_next_commits(&self, count: usize, failure: CommitFailure) {
        *self.failure.lock() = failure;
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn commit_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn failed_commits(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Successful commits that touched notes or tombstones
    pub fn note_commits(&self) -> usize {
        self.note_commits.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<CommitFailure> {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| *self.failure.lock())
    }
}

impl Storage for FlakyStorage {
    fn get(&self, space: Keyspace, key: &str) -> notesync_core::Result<Option<Vec<u8>>> {
        self.inner.get(space, key)
    }

    fn scan(&self, space: Keyspace) -> notesync_core::Result<Vec<(String, Vec<u8>)>> {
        self.inner.scan(space)
    }

    fn commit(&self, batch: WriteBatch) -> notesync_core::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.take_failure() {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(match failure {
                CommitFailure::Busy => CoreError::StorageBusy("injected".to_string()),
                CommitFailure::Hard => CoreError::Internal("injected commit failure".to_string()),
            });
        }
        let touches_notes = batch.ops().iter().any(|op| {
            let space = match op {
                BatchOp::Put { space, .. } | BatchOp::Delete { space, .. } => *space,
            };
            matches!(space, Keyspace::Notes | Keyspace::Tombstones)
        });
        self.inner.commit(batch)?;
        if touches_notes {
            self.note_commits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Failure a scripted remote returns in place of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// HTTP-style server error with the given status
    Status(u16),
    Network,
    /// A response body that does not parse
    Garbage,
}

impl RemoteFailure {
    fn to_error(&self) -> SyncError {
        match self {
            RemoteFailure::Status(status) => SyncError::Server {
                status: *status,
                message: "injected".to_string(),
            },
            RemoteFailure::Network => SyncError::Network("connection reset (injected)".to_string()),
            RemoteFailure::Garbage => SyncError::InvalidResponse("expected JSON (injected)".to_string()),
        }
    }
}

type PushHook = Box<dyn Fn(&PushRequest) + Send + Sync>;

#[derive(Default)]
struct Script {
    push_failures: Vec<RemoteFailure>,
    pull_failures: Vec<RemoteFailure>,
    delete_failures: Vec<RemoteFailure>,
    reject_tombstones: bool,
    latency: Option<Duration>,
}

/// Remote endpoint over an in-memory repository with scripted faults
///
/// Queued failures are consumed one per call. The push hook runs after the
/// request is captured and before the repository applies it, which is where a
/// concurrent local edit lands during a real push.
#[derive(Clone)]
pub struct ScriptedRemote {
    inner: InMemoryRemote,
    script: Arc<Mutex<Script>>,
    push_hook: Arc<Mutex<Option<PushHook>>>,
    pushes: Arc<Mutex<Vec<PushRequest>>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::with_repository(Arc::new(RemoteRepository::new()))
    }

    pub fn with_repository(repository: Arc<RemoteRepository>) -> Self {
        Self {
            inner: InMemoryRemote::with_repository(repository),
            script: Arc::new(Mutex::new(Script::default())),
            push_hook: Arc::new(Mutex::new(None)),
            pushes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn repository(&self) -> &Arc<RemoteRepository> {
        self.inner.repository()
    }

    pub fn fail_next_push(&self, failure: RemoteFailure) {
        self.script.lock().push_failures.push(failure);
    }

    pub fn fail_next_pull(&self, failure: RemoteFailure) {
        self.script.lock().pull_failures.push(failure);
    }

    pub fn fail_next_delete(&self, failure: RemoteFailure) {
        self.script.lock().delete_failures.push(failure);
    }

    /// Answer pushes with `tombstonesProcessed = false`
    pub fn reject_tombstones(&self, reject: bool) {
        self.script.lock().reject_tombstones = reject;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = Some(latency);
    }

    pub fn on_push<F>(&self, hook: F)
    where
        F: Fn(&PushRequest) + Send + Sync + 'static,
    {
        *self.push_hook.lock() = Some(Box::new(hook));
    }

    /// Every push request received, including failed ones
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    pub fn push_calls(&self) -> usize {
        self.pushes.lock().len()
    }

    pub fn pull_calls(&self) -> usize {
        self.inner.pull_calls()
    }

    async fn delay(&self) {
        let latency = self.script.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_failure(queue: &mut Vec<RemoteFailure>) -> Option<SyncError> {
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0).to_error())
        }
    }
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteEndpoint for ScriptedRemote {
    async fn push(&self, request: PushRequest) -> notesync_sync::Result<PushResponse> {
        self.pushes.lock().push(request.clone());
        self.delay().await;

        if let Some(error) = Self::next_failure(&mut self.script.lock().push_failures) {
            return Err(error);
        }
        if let Some(hook) = self.push_hook.lock().as_ref() {
            hook(&request);
        }

        let reject = self.script.lock().reject_tombstones;
        let mut response = if reject {
            // Notes are stored; tombstones are left for a later push
            let notes_only = PushRequest {
                tombstone_ids: Vec::new(),
                ..request
            };
            self.inner.push(notes_only).await?
        } else {
            self.inner.push(request).await?
        };
        if reject {
            response.tombstones_processed = false;
        }
        Ok(response)
    }

    async fn pull(&self, instance_id: &InstanceId) -> notesync_sync::Result<PullResponse> {
        self.delay().await;
        if let Some(error) = Self::next_failure(&mut self.script.lock().pull_failures) {
            return Err(error);
        }
        self.inner.pull(instance_id).await
    }

    async fn delete_one(&self, request: DeleteRequest) -> notesync_sync::Result<DeleteResponse> {
        self.delay().await;
        if let Some(error) = Self::next_failure(&mut self.script.lock().delete_failures) {
            return Err(error);
        }
        self.inner.delete_one(request).await
    }

    fn describe(&self) -> String {
        format!("scripted:{}", self.inner.describe())
    }
}

/// Sync config for tests: no periodic timer, no pass on start, fast retries
pub fn test_config() -> SyncConfig {
    SyncConfig::default()
        .without_periodic_sync()
        .with_sync_on_start(false)
        .with_request_timeout(Duration::from_secs(2))
        .with_retry_policy(notesync_core::RetryPolicy::new(2, 10, 50, 2.0))
}

/// In-memory session bound to `instance` and the given remote
pub fn memory_session(
    instance: &str,
    remote: Arc<dyn RemoteEndpoint>,
    connectivity: Connectivity,
) -> NoteSession {
    NoteSession::builder(test_config())
        .with_instance_id(InstanceId::parse(instance).expect("valid instance id"))
        .with_remote(remote)
        .with_connectivity(connectivity)
        .build()
        .expect("Failed to build session")
}

/// File-backed session for `user` under `dir`
pub fn disk_session(
    dir: &Path,
    user: &str,
    remote: Arc<dyn RemoteEndpoint>,
    connectivity: Connectivity,
) -> NoteSession {
    NoteSession::builder(test_config())
        .with_data_dir(dir)
        .with_user(user)
        .with_remote(remote)
        .with_connectivity(connectivity)
        .build()
        .expect("Failed to build session")
}

/// Store over flaky storage for atomicity tests
pub fn flaky_store(instance: &str) -> (Arc<FlakyStorage>, LocalNoteStore) {
    let storage = Arc::new(FlakyStorage::in_memory());
    let store = LocalNoteStore::new(
        storage.clone(),
        InstanceId::parse(instance).expect("valid instance id"),
    );
    (storage, store)
}
