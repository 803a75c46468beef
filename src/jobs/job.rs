//! Job record and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::webhook::JobSeed;

/// Lifecycle states of a classification job.
///
/// ```text
/// Queued -> InProgress -> { Finished | HumanInput | Failed }
/// HumanInput -> Finished
/// ```
///
/// `Finished` and `Failed` are terminal; only the cleanup sweep removes jobs
/// in those states. `HumanInput` is left exclusively through an explicit
/// operator resolution, never through a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    HumanInput,
    Finished,
    Failed,
}

impl JobStatus {
    /// Whether the retention sweep may evict a job in this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Finished)
                | (JobStatus::InProgress, JobStatus::HumanInput)
                | (JobStatus::InProgress, JobStatus::Failed)
                | (JobStatus::HumanInput, JobStatus::Finished)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::HumanInput => "human_input",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One unit of classification work.
///
/// `data` is an open bag: later mutations merge keys into it rather than
/// replacing it, so collaborator-supplied fields (`category`, `prompt`,
/// `response`, `errorMessage`) accumulate next to the seed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub status: JobStatus,
    pub data: Map<String, Value>,
}

impl Job {
    /// Create a queued job from a validated webhook seed.
    pub fn from_seed(seed: JobSeed) -> Self {
        let mut data = Map::new();
        data.insert(
            "destinationName".to_string(),
            Value::String(seed.destination_name),
        );
        data.insert("description".to_string(), Value::String(seed.description));
        data.insert("transactionId".to_string(), seed.transaction_id);
        data.insert(
            "transactions".to_string(),
            serde_json::to_value(seed.transactions).unwrap_or(Value::Null),
        );

        Self {
            id: Uuid::new_v4(),
            created: Utc::now(),
            status: JobStatus::Queued,
            data,
        }
    }

    /// Merge a partial data object into the bag, overwriting colliding keys.
    pub fn merge_data(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.data.insert(key, value);
        }
    }
}
