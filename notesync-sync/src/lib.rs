/// Note synchronization for NoteSync
///
/// Reconciles a local note store with a remote sync endpoint: dirty notes and
/// tombstones are pushed, the server's notes and tombstones are pulled back,
/// and a scheduler runs both on start, on a timer, on connectivity restore and
/// on request.

pub mod error;
pub mod config;
pub mod protocol;
pub mod http;
pub mod memory;
pub mod connectivity;
pub mod metadata;
pub mod engine;
pub mod scheduler;
pub mod session;

pub use config::SyncConfig;
pub use connectivity::Connectivity;
pub use engine::{PullReport, PushReport, ReconciliationEngine, SyncEvent, SyncReport, SyncState};
pub use error::{Result, SyncError};
pub use http::HttpTransport;
pub use memory::{InMemoryRemote, RemoteRepository};
pub use metadata::{SyncMetadata, SyncMetadataStore};
pub use protocol::{
    DeleteRequest, DeleteResponse, PullResponse, PushRequest, PushResponse, RejectedNote,
    RemoteEndpoint,
};
pub use scheduler::{Scheduler, SyncTrigger};
pub use session::{open_registry, DeleteOutcome, NoteSession, SessionBuilder, SessionStatus};

use serde::{Deserialize, Serialize};

/// Sync statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub skipped_syncs: u64,
    pub notes_pushed: u64,
    pub notes_pulled: u64,
    pub tombstones_cleared: u64,
    pub remote_deletions_applied: u64,
    pub last_sync_time: Option<i64>,
    pub avg_sync_duration_ms: u64,
}
