//! Bounded pool of merge workers.
//!
//! A fixed number of tokio tasks pull changes from one unbounded queue, so
//! submission never blocks the poller and at most `size` merges run at once.
//! Dispatch is FIFO; completion order is whatever the merges make it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::PoolError;
use crate::models::{Change, WorkerReport};
use crate::worker::MergeWorker;

/// Aggregate counters across all worker runs.
#[derive(Debug, Default)]
struct PoolCounters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    published: AtomicU64,
    panicked: AtomicU64,
}

/// Snapshot of [`WorkerPool`] activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Submitted but not yet picked up by a worker task.
    pub queued: usize,
    /// Currently being merged.
    pub in_flight: usize,
    /// Worker runs that produced a report.
    pub completed: u64,
    /// Runs whose merge reached the remote.
    pub published: u64,
    /// Runs that panicked instead of producing a report.
    pub panicked: u64,
}

pub struct WorkerPool {
    tx: Option<mpsc::UnboundedSender<Change>>,
    handles: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
    size: usize,
}

impl WorkerPool {
    /// Start `size` worker tasks sharing `worker`. Each finished run is
    /// forwarded to `reports` when a sink is given.
    pub fn spawn(
        size: usize,
        worker: Arc<MergeWorker>,
        reports: Option<mpsc::UnboundedSender<WorkerReport>>,
    ) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Change>();
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(PoolCounters::default());

        let handles = (0..size)
            .map(|slot| {
                tokio::spawn(worker_loop(
                    slot,
                    rx.clone(),
                    worker.clone(),
                    counters.clone(),
                    reports.clone(),
                ))
            })
            .collect();

        info!(size, "worker pool started");
        Self {
            tx: Some(tx),
            handles,
            counters,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue `change` for merging. Never waits for a free worker.
    pub fn submit(&self, change: Change) -> Result<(), PoolError> {
        let number = change.number;
        let tx = self.tx.as_ref().ok_or(PoolError::Closed(number))?;
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if tx.send(change).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::Closed(number));
        }
        debug!(pr = number, "change queued");
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        snapshot(&self.counters)
    }

    /// Stop accepting work and wait for every queued and running merge to
    /// finish. Running merges are never cancelled.
    pub async fn shutdown(mut self) -> PoolStats {
        self.tx.take();
        let stats = self.stats();
        info!(
            queued = stats.queued,
            in_flight = stats.in_flight,
            "worker pool draining"
        );
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        let stats = self.stats();
        info!(
            completed = stats.completed,
            published = stats.published,
            panicked = stats.panicked,
            "worker pool drained"
        );
        stats
    }
}

async fn worker_loop(
    slot: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Change>>>,
    worker: Arc<MergeWorker>,
    counters: Arc<PoolCounters>,
    reports: Option<mpsc::UnboundedSender<WorkerReport>>,
) {
    debug!(slot, "worker task started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(change) = next else { break };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        let number = change.number;

        // Run each merge in its own task so a panic is contained to it.
        let worker = worker.clone();
        let result = tokio::spawn(async move { worker.run(&change).await }).await;
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(report) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
                if report.outcome.is_published() {
                    counters.published.fetch_add(1, Ordering::SeqCst);
                }
                debug!(
                    slot,
                    pr = number,
                    duration_ms = report.duration_ms(),
                    "worker run finished"
                );
                if let Some(sink) = &reports {
                    let _ = sink.send(report);
                }
            }
            Err(e) => {
                counters.panicked.fetch_add(1, Ordering::SeqCst);
                warn!(slot, pr = number, error = %e, "merge worker panicked");
            }
        }
    }
    debug!(slot, "worker task stopped");
}

fn snapshot(counters: &PoolCounters) -> PoolStats {
    PoolStats {
        queued: counters.queued.load(Ordering::SeqCst),
        in_flight: counters.in_flight.load(Ordering::SeqCst),
        completed: counters.completed.load(Ordering::SeqCst),
        published: counters.published.load(Ordering::SeqCst),
        panicked: counters.panicked.load(Ordering::SeqCst),
    }
}
