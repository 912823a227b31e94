//! Reconciliation worker pool
//!
//! Polls the status store and dispatches reconciliations onto a bounded set
//! of tasks. A request is due when its requeue deadline has passed or its
//! record changed since the last reconciliation finished. Only one
//! reconciliation per request runs at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use stratum_cloud::{ResourceRecord, Result};
use tokio::sync::Semaphore;
use tokio::time::{Instant, interval};
use tracing::{debug, error, info, warn};

use crate::reconciler::Reconciler;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent reconciliations.
    pub concurrency: usize,

    /// How often to poll the status store.
    pub poll_interval: Duration,

    /// Requeue delay after a reconciliation returned an error.
    pub error_requeue: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(5),
            error_requeue: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct ScheduleEntry {
    /// Record version the last finished reconciliation left behind
    seen_version: u64,
    /// Next requeue deadline, None when waiting for a change
    due: Option<Instant>,
    in_flight: bool,
}

type Schedule = Arc<Mutex<HashMap<String, ScheduleEntry>>>;

/// Drives a [`Reconciler`] over every record in its store.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
    schedule: Schedule,
    shutdown: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>, config: WorkerConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            reconciler,
            config: WorkerConfig {
                concurrency,
                ..config
            },
            semaphore: Arc::new(Semaphore::new(concurrency)),
            schedule: Arc::new(Mutex::new(HashMap::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Poll until shutdown is requested, then wait for in-flight work.
    pub async fn run(&self) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_secs = self.config.poll_interval.as_secs_f64(),
            "Starting reconciliation worker"
        );

        let mut poll_interval = interval(self.config.poll_interval);
        loop {
            poll_interval.tick().await;
            if self.is_shutdown() {
                info!("Worker shutdown requested, stopping poll loop");
                break;
            }
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Failed to poll status store");
            }
        }

        info!("Waiting for in-flight reconciliations to complete...");
        self.drain().await;
        info!("Worker stopped");
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Wait until no reconciliation is running.
    pub async fn drain(&self) {
        let permits = self.config.concurrency as u32;
        if let Ok(all) = self.semaphore.acquire_many(permits).await {
            drop(all);
        }
    }

    /// One pass over the store: discard finished records and dispatch every
    /// due request. Returns the number of reconciliations started.
    pub async fn poll_once(&self) -> Result<usize> {
        let store = self.reconciler.store().clone();
        let records = store.list().await?;
        let now = Instant::now();

        {
            let mut schedule = lock(&self.schedule);
            schedule.retain(|name, entry| {
                entry.in_flight || records.iter().any(|r| r.name() == name)
            });
        }

        let mut started = 0;
        for record in records {
            if record.is_removable() {
                if self.is_in_flight(record.name()) {
                    continue;
                }
                match store.remove(record.name()).await {
                    Ok(()) => {
                        info!(name = record.name(), "Removed deleted record");
                        lock(&self.schedule).remove(record.name());
                    }
                    Err(e) => warn!(name = record.name(), error = %e, "Failed to remove record"),
                }
                continue;
            }

            if !self.claim_if_due(&record, now) {
                continue;
            }

            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!("All worker slots busy, deferring remaining requests");
                self.release_claim(record.name());
                break;
            };

            let reconciler = self.reconciler.clone();
            let schedule = self.schedule.clone();
            let error_requeue = self.config.error_requeue;
            let name = record.name().to_string();
            let dispatched_version = record.version;

            tokio::spawn(async move {
                let _permit = permit;
                let result = reconciler.reconcile_versioned(&name).await;
                let finished = Instant::now();

                let mut schedule = lock(&schedule);
                let Some(entry) = schedule.get_mut(&name) else {
                    return;
                };
                entry.in_flight = false;
                match result {
                    Ok((action, version)) => {
                        debug!(name = %name, %action, "Reconciled");
                        entry.seen_version = version.unwrap_or(dispatched_version);
                        entry.due = action.requeue_after().map(|d| finished + d);
                    }
                    Err(e) => {
                        error!(name = %name, error = %e, "Reconciliation failed");
                        entry.seen_version = dispatched_version;
                        entry.due = Some(finished + error_requeue);
                    }
                }
            });
            started += 1;
        }

        Ok(started)
    }

    fn is_in_flight(&self, name: &str) -> bool {
        lock(&self.schedule)
            .get(name)
            .is_some_and(|entry| entry.in_flight)
    }

    /// Mark the request in flight when its deadline passed or its record
    /// changed. New requests are always due.
    fn claim_if_due(&self, record: &ResourceRecord, now: Instant) -> bool {
        let mut schedule = lock(&self.schedule);
        let entry = schedule
            .entry(record.name().to_string())
            .or_insert(ScheduleEntry {
                seen_version: 0,
                due: Some(now),
                in_flight: false,
            });

        if entry.in_flight {
            return false;
        }
        let expired = entry.due.is_some_and(|due| due <= now);
        let edited = entry.seen_version != record.version;
        if !(expired || edited) {
            return false;
        }
        entry.in_flight = true;
        true
    }

    fn release_claim(&self, name: &str) {
        if let Some(entry) = lock(&self.schedule).get_mut(name) {
            entry.in_flight = false;
        }
    }
}

fn lock(schedule: &Schedule) -> MutexGuard<'_, HashMap<String, ScheduleEntry>> {
    schedule.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
