//! Retention sweep for terminal jobs.
//!
//! The registry is in-memory, so finished and failed jobs would accumulate
//! forever without eviction. The scheduler sweeps on a fixed period and
//! deletes terminal jobs older than the retention window; transient jobs
//! are never touched, no matter how old.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::CleanupConfig;
use crate::jobs::JobStore;

/// Periodic eviction of old terminal jobs.
pub struct CleanupScheduler {
    store: Arc<JobStore>,
    config: CleanupConfig,
}

impl CleanupScheduler {
    pub fn new(store: Arc<JobStore>, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    /// Run the sweep loop forever. The first tick is skipped so a restart
    /// never races a sweep against jobs still being re-submitted.
    pub async fn run(&self) {
        tracing::info!(
            interval = ?self.config.interval,
            retention = ?self.config.retention,
            "starting cleanup loop"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.tick().await;

        loop {
            interval.tick().await;
            let deleted = self.sweep().await;
            if deleted > 0 {
                tracing::info!(deleted, "cleanup sweep evicted jobs");
            }
        }
    }

    /// One sweep as of now. Also the manual/operational trigger.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// One sweep as of the given instant. Deletes a job iff its status is
    /// terminal and `now - created` exceeds the retention window.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let retention =
            Duration::from_std(self.config.retention).unwrap_or_else(|_| Duration::hours(24));

        let expired: Vec<_> = self
            .store
            .jobs()
            .await
            .into_iter()
            .filter(|job| job.status.is_terminal() && now - job.created > retention)
            .map(|job| job.id)
            .collect();

        let mut deleted = 0;
        for id in expired {
            if self.store.delete_job(id).await {
                deleted += 1;
            }
        }
        deleted
    }
}
