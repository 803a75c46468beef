//! Operator resolution of jobs the classifier could not decide.
//!
//! Keys on the job id; the ledger transaction id is payload inside the job,
//! never a lookup key. Runs outside the processing queue: resolution is a
//! short call, not rate-limited classification work. The final commit goes
//! through the store's atomic `finish_human_input`, so it cannot race a
//! queue task or a duplicate resolution on the same job.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{JobError, ResolveError};
use crate::jobs::{Job, JobStatus, JobStore};
use crate::ledger::LedgerClient;
use crate::webhook::WebhookTransaction;

/// Finalizes `human_input` jobs with an operator-chosen category.
pub struct HumanInputResolver {
    store: Arc<JobStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl HumanInputResolver {
    pub fn new(store: Arc<JobStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { store, ledger }
    }

    /// Resolve a parked job with the given catalog category name.
    ///
    /// Fails without touching the job when it does not exist, is not in
    /// `human_input`, or the category is not in the ledger catalog.
    pub async fn resolve(&self, job_id: Uuid, category: &str) -> Result<Job, ResolveError> {
        let job = self
            .store
            .get_job(job_id)
            .await
            .ok_or(JobError::NotFound { id: job_id })?;

        if job.status != JobStatus::HumanInput {
            return Err(JobError::InvalidState {
                id: job_id,
                status: job.status,
                expected: JobStatus::HumanInput,
            }
            .into());
        }

        let catalog = self.ledger.fetch_categories().await?;
        let category_id = catalog
            .get(category)
            .ok_or_else(|| JobError::UnknownCategory {
                name: category.to_string(),
            })?;

        let transaction_id = job.data.get("transactionId").cloned().unwrap_or(Value::Null);
        let transactions: Vec<WebhookTransaction> = job
            .data
            .get("transactions")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        self.ledger
            .assign_category(&transaction_id, &transactions, category_id)
            .await?;

        let job = self.store.finish_human_input(job_id, category).await?;
        tracing::info!(job_id = %job_id, category, "operator resolution applied");
        Ok(job)
    }
}
