use notesync_core::RetryPolicy;
use std::time::Duration;

/// Default periodic sync interval (five minutes)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default bound on a single request to the remote endpoint
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sync configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote sync endpoint
    pub server_url: String,
    /// Automatic sync interval; `None` disables the periodic trigger
    pub sync_interval: Option<Duration>,
    /// Timeout applied to every remote call
    pub request_timeout: Duration,
    /// Backoff for retrying failed passes before waiting for the next trigger
    pub retry_policy: RetryPolicy,
    /// Run a pass as soon as the scheduler starts
    pub sync_on_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            sync_interval: Some(DEFAULT_SYNC_INTERVAL),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::standard(),
            sync_on_start: true,
        }
    }
}

impl SyncConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    pub fn without_periodic_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_sync_on_start(mut self, enabled: bool) -> Self {
        self.sync_on_start = enabled;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.server_url.trim().is_empty() {
            return Err("server_url must not be empty".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than zero".to_string());
        }
        if let Some(interval) = self.sync_interval {
            if interval.is_zero() {
                return Err("sync_interval must be greater than zero".to_string());
            }
        }
        self.retry_policy.validate()
    }
}
