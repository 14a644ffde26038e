//! Bounded-concurrency fetch queue.
//!
//! The queue holds one semaphore permit per worker. Scheduling waits for a
//! permit and then spawns the fetch, so callers only block while every
//! worker is busy. Each fetch runs under its own timeout, independent of
//! whoever scheduled it.
//!
//! A timed-out fetch gives its permit back straight away. Archive processing
//! it already handed to a blocking thread stops at the next directory
//! boundary, so for a short while more than `workers` threads may still be
//! busy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use exn::ResultExt;
use modfetch_config::QueueConfig;
use tokio::sync::Semaphore;
use tracing::{Instrument, instrument};

use crate::error::{ErrorKind, Result};
use crate::fetch::Fetcher;

/// One unit of work. Items with the same identity are never run
/// concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub module_path: String,
    pub version: String,
    /// Distinguishes deliberate re-fetches of the same version.
    pub suffix: Option<String>,
}

impl WorkItem {
    pub fn new(module_path: impl Into<String>, version: impl Into<String>, suffix: Option<String>) -> Self {
        Self { module_path: module_path.into(), version: version.into(), suffix }
    }
}

type InFlight = Arc<Mutex<HashSet<WorkItem>>>;

/// Removes its item from the in-flight set when dropped, whether the fetch
/// finished or scheduling was abandoned.
struct InFlightGuard {
    in_flight: InFlight,
    item: WorkItem,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.item);
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    fetcher: Fetcher,
    permits: Arc<Semaphore>,
    workers: u32,
    fetch_timeout: Duration,
    in_flight: InFlight,
}

impl TaskQueue {
    pub fn new(fetcher: Fetcher, workers: usize, fetch_timeout: Duration) -> Result<Self> {
        let workers = u32::try_from(workers.max(1)).or_raise(|| ErrorKind::Internal(format!("{workers} workers")))?;
        Ok(Self {
            fetcher,
            permits: Arc::new(Semaphore::new(workers as usize)),
            workers,
            fetch_timeout,
            in_flight: Arc::default(),
        })
    }

    pub fn from_config(fetcher: Fetcher, config: &QueueConfig) -> Result<Self> {
        Self::new(fetcher, config.workers, config.fetch_timeout())
    }

    /// Schedule a fetch of `module_path@version`.
    ///
    /// Waits while every worker is busy. Returns `false` without scheduling
    /// anything if the same item is already queued or running. Dropping the
    /// returned future before it completes schedules nothing; fetches that
    /// were already started are unaffected.
    #[instrument(skip(self))]
    pub async fn schedule(&self, module_path: &str, version: &str, suffix: Option<&str>) -> Result<bool> {
        let item = WorkItem::new(module_path, version, suffix.map(String::from));
        if !self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).insert(item.clone()) {
            tracing::debug!("already in flight, skipping");
            return Ok(false);
        }
        let guard = InFlightGuard { in_flight: self.in_flight.clone(), item };
        let permit =
            self.permits.clone().acquire_owned().await.or_raise(|| ErrorKind::Internal("queue is closed".to_string()))?;

        let fetcher = self.fetcher.clone();
        let fetch_timeout = self.fetch_timeout;
        let span = tracing::info_span!("fetch", module = %guard.item.module_path, version = %guard.item.version);
        tokio::spawn(
            async move {
                let _permit = permit;
                let item = &guard.item;
                let fetch = fetcher.fetch_and_update_state(&item.module_path, &item.version);
                match tokio::time::timeout(fetch_timeout, fetch).await {
                    Ok((status, _)) => tracing::debug!(%status, "fetch finished"),
                    Err(_) => {
                        tracing::warn!(timeout = ?fetch_timeout, "fetch timed out");
                        if let Err(err) = fetcher.record_timeout(&item.module_path, &item.version).await {
                            tracing::error!(error = ?err, "could not record timeout");
                        }
                    },
                }
                drop(guard);
            }
            .instrument(span),
        );
        Ok(true)
    }

    /// Wait until no fetch is running.
    ///
    /// Holds every permit at once, then gives them all back.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<()> {
        let _all = self
            .permits
            .acquire_many(self.workers)
            .await
            .or_raise(|| ErrorKind::Internal("queue is closed".to_string()))?;
        tracing::debug!("queue drained");
        Ok(())
    }

    /// Schedule up to `limit` versions that are due for a first attempt or a
    /// retry. Returns how many were scheduled.
    #[instrument(skip(self))]
    pub async fn requeue(&self, limit: usize) -> Result<usize> {
        let due = self.fetcher.persistence().get_next_versions_to_fetch(limit).await?;
        let mut scheduled = 0;
        for state in due {
            if self.schedule(&state.module_path, &state.version, None).await? {
                scheduled += 1;
            }
        }
        tracing::info!(scheduled, "requeued versions");
        Ok(scheduled)
    }
}
