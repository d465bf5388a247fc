//! Background Report Refresh
//!
//! A single worker rebuilds the [`Report`] on a fixed delay and publishes it
//! by swapping one `Arc`. Readers clone the `Arc` they find, so they always
//! hold a complete snapshot, old or new, and nobody mutates a published one.
//!
//! Each refresh opens its own store connection on a blocking thread.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::report::Report;
use crate::store::EventStore;

/// Latest published snapshot
#[derive(Default)]
pub struct SnapshotCache {
    current: RwLock<Option<Arc<Report>>>,
    generation: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot currently visible to readers
    pub fn current(&self) -> Option<Arc<Report>> {
        self.current.read().clone()
    }

    /// Replace the published snapshot as a whole
    pub fn publish(&self, report: Report) {
        let report = Arc::new(report);
        *self.current.write() = Some(report);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Published report snapshot #{}", generation);
    }

    /// Number of snapshots published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

/// Build a report with a fresh connection to `db_path`
pub fn build_report(db_path: &Path, path_prefix: &str) -> Result<Report> {
    let store = EventStore::open(db_path)?;
    Report::build(&store, Utc::now(), path_prefix)
}

/// Same as [`build_report`], off the async runtime
pub async fn build_report_blocking(db_path: PathBuf, path_prefix: String) -> Result<Report> {
    tokio::task::spawn_blocking(move || build_report(&db_path, &path_prefix))
        .await
        .context("report task panicked")?
}

/// Periodic worker feeding a [`SnapshotCache`]
pub struct RefreshWorker {
    db_path: PathBuf,
    path_prefix: String,
    delay: Duration,
    cache: Arc<SnapshotCache>,
}

impl RefreshWorker {
    pub fn new(db_path: PathBuf, path_prefix: String, delay: Duration, cache: Arc<SnapshotCache>) -> Self {
        Self {
            db_path,
            path_prefix,
            delay,
            cache,
        }
    }

    /// Rebuild and publish once; a failed build keeps the previous snapshot
    pub async fn refresh_once(&self) -> Result<()> {
        let report = build_report_blocking(self.db_path.clone(), self.path_prefix.clone()).await?;
        self.cache.publish(report);
        Ok(())
    }

    /// Refresh immediately, then every `delay`, until `shutdown` flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Report refresh worker started (every {:?})", self.delay);

        loop {
            if let Err(e) = self.refresh_once().await {
                warn!("Report refresh failed: {:#}", e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Report refresh worker stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Where report requests are answered from
#[derive(Clone)]
pub enum ReportSource {
    /// Serve the worker's last snapshot
    Cached(Arc<SnapshotCache>),
    /// Recompute on every request
    Realtime { db_path: PathBuf, path_prefix: String },
}

impl ReportSource {
    /// `Ok(None)` while the cache has not published anything yet
    pub async fn report(&self) -> Result<Option<Arc<Report>>> {
        match self {
            ReportSource::Cached(cache) => Ok(cache.current()),
            ReportSource::Realtime {
                db_path,
                path_prefix,
            } => {
                let report = build_report_blocking(db_path.clone(), path_prefix.clone()).await?;
                Ok(Some(Arc::new(report)))
            }
        }
    }
}
