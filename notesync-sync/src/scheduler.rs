/// Sync scheduler
///
/// Triggers full sync passes on start, on a periodic timer, when connectivity
/// returns and on explicit request. Failed passes are retried with bounded
/// backoff before waiting for the next trigger.

use notesync_core::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::engine::ReconciliationEngine;
use crate::SyncError;

/// Handle for requesting a sync pass from any task
#[derive(Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Request a pass. Returns false if one is already pending or the
    /// scheduler has stopped.
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

pub struct Scheduler {
    engine: Arc<ReconciliationEngine>,
    connectivity: Connectivity,
    sync_interval: Option<Duration>,
    retry_policy: RetryPolicy,
    sync_on_start: bool,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Option<mpsc::Receiver<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        connectivity: Connectivity,
        config: &SyncConfig,
    ) -> Self {
        // A single slot coalesces bursts of manual triggers into one pass
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Self {
            engine,
            connectivity,
            sync_interval: config.sync_interval,
            retry_policy: config.retry_policy.clone(),
            sync_on_start: config.sync_on_start,
            trigger_tx,
            trigger_rx: Some(trigger_rx),
            shutdown_tx: None,
            handle: None,
        }
    }

    pub fn trigger_handle(&self) -> SyncTrigger {
        SyncTrigger {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Request a pass
    pub fn trigger(&self) -> bool {
        self.trigger_handle().trigger()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Start the scheduler loop on the current runtime
    pub fn start(&mut self) {
        let Some(mut trigger_rx) = self.trigger_rx.take() else {
            tracing::warn!("scheduler already started");
            return;
        };

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let engine = self.engine.clone();
        let retry_policy = self.retry_policy.clone();
        let sync_on_start = self.sync_on_start;
        let mut online_rx = self.connectivity.subscribe();
        let mut ticker = self.sync_interval.map(|period| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        self.handle = Some(tokio::spawn(async move {
            tracing::info!(instance_id = %engine.instance_id(), "sync scheduler started");

            if sync_on_start && run_pass(&engine, &retry_policy, &mut shutdown_rx, "start").await {
                return;
            }

            let mut was_online = *online_rx.borrow_and_update();
            let mut watching_connectivity = true;

            loop {
                let reason = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    Some(()) = trigger_rx.recv() => "manual",
                    _ = next_tick(&mut ticker) => "interval",
                    changed = online_rx.changed(), if watching_connectivity => {
                        if changed.is_err() {
                            watching_connectivity = false;
                            continue;
                        }
                        let online = *online_rx.borrow_and_update();
                        let restored = online && !was_online;
                        was_online = online;
                        if !restored {
                            continue;
                        }
                        "connectivity"
                    }
                };

                if run_pass(&engine, &retry_policy, &mut shutdown_rx, reason).await {
                    break;
                }
            }

            tracing::info!("sync scheduler shutting down");
        }));
    }

    /// Stop the scheduler and wait for the loop to exit
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "sync scheduler task failed");
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Run one pass with retries. Returns true if shutdown was requested.
async fn run_pass(
    engine: &ReconciliationEngine,
    policy: &RetryPolicy,
    shutdown_rx: &mut mpsc::Receiver<()>,
    reason: &str,
) -> bool {
    let mut attempt = 0;
    loop {
        match engine.sync().await {
            Ok(report) if report.skipped => {
                tracing::debug!(reason, "sync pass coalesced with one in flight");
                return false;
            }
            Ok(report) => {
                tracing::debug!(reason, duration_ms = report.duration_ms, "scheduled sync completed");
                return false;
            }
            Err(SyncError::Offline) => {
                tracing::debug!(reason, "offline; waiting for connectivity");
                return false;
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff_duration(attempt);
                attempt += 1;
                tracing::warn!(
                    reason,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "sync pass failed; retrying"
                );
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => return true,
                }
            }
            Err(e) => {
                tracing::error!(reason, code = e.code(), error = %e, "sync pass failed");
                return false;
            }
        }
    }
}
