//! Top-level polling loop.
//!
//! Each cycle lists open pull requests, records the unseen ones in the
//! [`ProcessedRegistry`] and hands them to the [`WorkerPool`], then sleeps.
//! A shutdown request stops new submissions and drains the pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::models::PollStats;
use crate::pool::{PoolStats, WorkerPool};
use crate::registry::ProcessedRegistry;
use crate::source::ChangeSource;

pub struct Poller {
    source: Arc<dyn ChangeSource>,
    registry: Arc<ProcessedRegistry>,
    pool: WorkerPool,
    poll_interval: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        registry: Arc<ProcessedRegistry>,
        pool: WorkerPool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            registry,
            pool,
            poll_interval,
        }
    }

    pub fn registry(&self) -> &ProcessedRegistry {
        &self.registry
    }

    /// One poll cycle. A listing failure is logged and treated as "nothing
    /// new"; the registry is left untouched.
    pub async fn poll_once(&self) -> PollStats {
        let changes = match self.source.list_open_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                error!(error = %e, "listing open pull requests failed");
                return PollStats {
                    list_failed: true,
                    ..PollStats::default()
                };
            }
        };

        let mut stats = PollStats {
            open: changes.len(),
            ..PollStats::default()
        };

        for change in changes {
            // Record before submitting so an in-flight merge is never queued twice.
            if !self.registry.insert_new(change.number) {
                continue;
            }
            let number = change.number;
            let title = change.title.clone();
            match self.pool.submit(change) {
                Ok(()) => {
                    stats.submitted += 1;
                    info!(pr = number, title = %title, "queued pull request");
                }
                Err(e) => {
                    error!(pr = number, error = %e, "could not queue pull request");
                }
            }
        }

        if stats.submitted == 0 {
            info!(
                open = stats.open,
                "no new pull requests; re-checking in {}s",
                self.poll_interval.as_secs()
            );
        }
        stats
    }

    /// Poll until `shutdown` becomes `true`, then drain in-flight merges.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> PoolStats {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            workers = self.pool.size(),
            "starting polling loop"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("shutdown signal source dropped, stopping");
                        break;
                    }
                }
            }
        }

        info!("shutdown requested; waiting for in-flight merges to finish");
        self.drain().await
    }

    /// Stop submitting and wait for every queued and running merge.
    pub async fn drain(self) -> PoolStats {
        let stats = self.pool.shutdown().await;
        info!(
            processed = self.registry.len(),
            completed = stats.completed,
            "poller stopped"
        );
        stats
    }
}
