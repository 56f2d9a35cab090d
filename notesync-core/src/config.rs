use crate::retry::RetryPolicy;

/// Local storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Fsync the commit log after every commit
    pub sync_writes: bool,

    /// Number of log records after which the commit log is compacted
    pub compact_after_records: u64,

    /// Retry policy for commits that hit a busy store
    pub commit_retry: RetryPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sync_writes: true,
            compact_after_records: 1_000,
            commit_retry: RetryPolicy::fast(),
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip fsync after each commit (tests and throwaway stores)
    pub fn without_sync_writes(mut self) -> Self {
        self.sync_writes = false;
        self
    }

    pub fn with_compact_after_records(mut self, records: u64) -> Self {
        self.compact_after_records = records;
        self
    }

    pub fn with_commit_retry(mut self, policy: RetryPolicy) -> Self {
        self.commit_retry = policy;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.compact_after_records < 2 {
            return Err("compact_after_records must be at least 2".to_string());
        }
        self.commit_retry.validate()
    }
}
