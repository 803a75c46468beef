//! Lifecycle events emitted by the job store.

use serde::Serialize;
use uuid::Uuid;

use crate::jobs::Job;

/// A store mutation, carrying the affected job and a full snapshot.
///
/// The snapshot rides along so subscribers stay self-consistent without
/// replaying history; a freshly connected observer and a long-lived one see
/// the same registry after any single event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    Created { job: Job, jobs: Vec<Job> },
    Updated { job: Job, jobs: Vec<Job> },
    Deleted { id: Uuid, jobs: Vec<Job> },
}
