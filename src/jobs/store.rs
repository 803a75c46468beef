//! In-memory job registry.
//!
//! The store is the single owner of all jobs. Every other component refers
//! to jobs by id and goes through these operations; mutations serialize on
//! the write lock, so a webhook create, a queue-worker transition, an
//! operator resolution, and a cleanup delete can never interleave on the
//! same job. The registry is volatile by design: restart forgets everything.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::{Job, JobEvent, JobStatus};
use crate::webhook::JobSeed;

/// Buffered events per subscriber; slow observers drop, never block.
const EVENT_BUFFER: usize = 256;

/// Registry of classification jobs with lifecycle event fan-out.
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    events: broadcast::Sender<JobEvent>,
}

impl JobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            jobs: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to lifecycle events. Lossy for slow consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Create a queued job from a validated webhook seed.
    pub async fn create_job(&self, seed: JobSeed) -> Job {
        let job = Job::from_seed(seed);

        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        let snapshot = jobs.values().cloned().collect();
        drop(jobs);

        tracing::info!(job_id = %job.id, "job created");
        let _ = self.events.send(JobEvent::Created {
            job: job.clone(),
            jobs: snapshot,
        });

        job
    }

    /// Fetch a single job.
    pub async fn get_job(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Full registry snapshot.
    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Merge partial data into a job's bag. No-op if the id is unknown.
    pub async fn update_data(&self, id: Uuid, partial: Map<String, Value>) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            tracing::warn!(job_id = %id, "update_data on unknown job, ignoring");
            return;
        };

        job.merge_data(partial);
        let job = job.clone();
        let snapshot = jobs.values().cloned().collect();
        drop(jobs);

        let _ = self.events.send(JobEvent::Updated {
            job,
            jobs: snapshot,
        });
    }

    pub async fn set_in_progress(&self, id: Uuid) -> bool {
        self.transition(id, JobStatus::InProgress, Map::new()).await
    }

    pub async fn set_finished(&self, id: Uuid) -> bool {
        self.transition(id, JobStatus::Finished, Map::new()).await
    }

    pub async fn set_human_input(&self, id: Uuid) -> bool {
        self.transition(id, JobStatus::HumanInput, Map::new()).await
    }

    /// Mark a job failed, recording the error message.
    ///
    /// Emits `Updated` like every other transition; a failure no observer
    /// can see would strand the job in the UI.
    pub async fn set_failed(&self, id: Uuid, message: impl Into<String>) -> bool {
        let mut extra = Map::new();
        extra.insert("errorMessage".to_string(), Value::String(message.into()));
        self.transition(id, JobStatus::Failed, extra).await
    }

    /// Atomically verify `HumanInput`, merge the chosen category, and finish.
    ///
    /// The resolver's external calls happen before this; doing the final
    /// check-and-commit under one write lock closes the race with a
    /// concurrent duplicate resolution.
    pub async fn finish_human_input(
        &self,
        id: Uuid,
        category: impl Into<String>,
    ) -> Result<Job, JobError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound { id })?;

        if job.status != JobStatus::HumanInput {
            return Err(JobError::InvalidState {
                id,
                status: job.status,
                expected: JobStatus::HumanInput,
            });
        }

        let mut partial = Map::new();
        partial.insert("category".to_string(), Value::String(category.into()));
        job.merge_data(partial);
        job.status = JobStatus::Finished;

        let job = job.clone();
        let snapshot = jobs.values().cloned().collect();
        drop(jobs);

        tracing::info!(job_id = %id, "job resolved by operator");
        let _ = self.events.send(JobEvent::Updated {
            job: job.clone(),
            jobs: snapshot,
        });

        Ok(job)
    }

    /// Remove a job. Used by the cleanup sweep only.
    pub async fn delete_job(&self, id: Uuid) -> bool {
        let mut jobs = self.jobs.write().await;
        if jobs.remove(&id).is_none() {
            return false;
        }
        let snapshot = jobs.values().cloned().collect();
        drop(jobs);

        tracing::info!(job_id = %id, "job deleted");
        let _ = self.events.send(JobEvent::Deleted { id, jobs: snapshot });
        true
    }

    /// Guarded status transition. No-op (with a warning) when the id is
    /// unknown or the state machine forbids the move.
    async fn transition(&self, id: Uuid, next: JobStatus, extra: Map<String, Value>) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            tracing::warn!(job_id = %id, to = %next, "transition on unknown job, ignoring");
            return false;
        };

        if !job.status.can_transition_to(next) {
            tracing::warn!(
                job_id = %id,
                from = %job.status,
                to = %next,
                "illegal transition, ignoring"
            );
            return false;
        }

        job.status = next;
        job.merge_data(extra);

        let job = job.clone();
        let snapshot = jobs.values().cloned().collect();
        drop(jobs);

        tracing::debug!(job_id = %id, status = %next, "job transitioned");
        let _ = self.events.send(JobEvent::Updated {
            job,
            jobs: snapshot,
        });
        true
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
