//! Per-job classification protocol.
//!
//! One pipeline run drives a single job from `queued` to its outcome:
//! fetch the catalog, ask the classifier, then either assign the category on
//! the ledger and finish, or park the job for operator input. Collaborator
//! failures propagate to the queue worker, which records them on the job.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::classify::Classifier;
use crate::error::{JobError, TaskError};
use crate::events::{EventHub, WsEvent};
use crate::jobs::JobStore;
use crate::ledger::LedgerClient;
use crate::webhook::WebhookTransaction;

/// Drives one job through classification and resolution.
pub struct Pipeline {
    store: Arc<JobStore>,
    ledger: Arc<dyn LedgerClient>,
    classifier: Arc<dyn Classifier>,
    hub: Arc<EventHub>,
}

impl Pipeline {
    pub fn new(
        store: Arc<JobStore>,
        ledger: Arc<dyn LedgerClient>,
        classifier: Arc<dyn Classifier>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            store,
            ledger,
            classifier,
            hub,
        }
    }

    /// Process one job to completion or parking.
    ///
    /// Errors are the caller's to record; this function never marks the job
    /// `failed` itself.
    pub async fn process(&self, job_id: Uuid) -> Result<(), TaskError> {
        self.store.set_in_progress(job_id).await;

        let catalog = self.ledger.fetch_categories().await?;
        let mut names: Vec<String> = catalog.keys().cloned().collect();
        names.sort();

        let job = self
            .store
            .get_job(job_id)
            .await
            .ok_or(JobError::NotFound { id: job_id })?;

        let destination = string_field(&job.data, "destinationName");
        let description = string_field(&job.data, "description");

        let classification = self
            .classifier
            .classify(&names, &destination, &description)
            .await?;

        // Only catalog members may be assigned; anything else parks the job.
        let resolved = classification
            .category
            .as_ref()
            .and_then(|name| catalog.get(name).map(|id| (name.clone(), id.clone())));

        match resolved {
            Some((category, category_id)) => {
                let mut partial = Map::new();
                partial.insert("category".to_string(), Value::String(category.clone()));
                partial.insert(
                    "prompt".to_string(),
                    Value::String(classification.prompt.clone()),
                );
                partial.insert(
                    "response".to_string(),
                    Value::String(classification.response.clone()),
                );
                self.store.update_data(job_id, partial).await;

                let transaction_id = job.data.get("transactionId").cloned().unwrap_or(Value::Null);
                let transactions = transactions_field(&job.data);
                self.ledger
                    .assign_category(&transaction_id, &transactions, &category_id)
                    .await?;

                self.store.set_finished(job_id).await;
                tracing::info!(job_id = %job_id, category, "job classified");
            }
            None => {
                let mut partial = Map::new();
                partial.insert("category".to_string(), Value::Null);
                partial.insert(
                    "prompt".to_string(),
                    Value::String(classification.prompt.clone()),
                );
                partial.insert(
                    "response".to_string(),
                    Value::String(classification.response.clone()),
                );
                partial.insert(
                    "categories".to_string(),
                    serde_json::to_value(&names).unwrap_or(Value::Null),
                );
                self.store.update_data(job_id, partial).await;
                self.store.set_human_input(job_id).await;

                self.hub.publish(WsEvent::RequestCategoryInput {
                    transaction_id: job.data.get("transactionId").cloned().unwrap_or(Value::Null),
                    description,
                    prompt: classification.prompt,
                    categories: names,
                });
                tracing::info!(job_id = %job_id, "classifier declined, awaiting operator");
            }
        }

        Ok(())
    }
}

fn string_field(data: &Map<String, Value>, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn transactions_field(data: &Map<String, Value>) -> Vec<WebhookTransaction> {
    data.get("transactions")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Test doubles shared by the unit tests of the pipeline, queue, and
/// resolver.
#[cfg(test)]
pub(crate) mod doubles {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::classify::{Classification, Classifier};
    use crate::error::{ClassifyError, LedgerError};
    use crate::ledger::LedgerClient;
    use crate::webhook::WebhookTransaction;

    /// In-memory ledger: fixed catalog, records every assignment.
    #[derive(Default)]
    pub struct FakeLedger {
        pub catalog: HashMap<String, String>,
        pub assignments: Mutex<Vec<(Value, String)>>,
        pub fail_fetch: bool,
    }

    impl FakeLedger {
        pub fn with_catalog(pairs: &[(&str, &str)]) -> Self {
            Self {
                catalog: pairs
                    .iter()
                    .map(|(n, i)| (n.to_string(), i.to_string()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn fetch_categories(&self) -> Result<HashMap<String, String>, LedgerError> {
            if self.fail_fetch {
                return Err(LedgerError::RequestFailed {
                    status: None,
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self.catalog.clone())
        }

        async fn assign_category(
            &self,
            transaction_id: &Value,
            _transactions: &[WebhookTransaction],
            category_id: &str,
        ) -> Result<(), LedgerError> {
            self.assignments
                .lock()
                .unwrap()
                .push((transaction_id.clone(), category_id.to_string()));
            Ok(())
        }
    }

    /// Scripted classifier: fixed answer, optional failure, optional delay.
    pub struct FakeClassifier {
        pub answer: Option<String>,
        pub fail: bool,
        pub delay: Duration,
    }

    impl FakeClassifier {
        pub fn answering(category: &str) -> Self {
            Self {
                answer: Some(category.to_string()),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        pub fn declining() -> Self {
            Self {
                answer: None,
                fail: false,
                delay: Duration::ZERO,
            }
        }

        pub fn failing() -> Self {
            Self {
                answer: None,
                fail: true,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn classify(
            &self,
            _categories: &[String],
            destination: &str,
            _description: &str,
        ) -> Result<Classification, ClassifyError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(ClassifyError::RequestFailed {
                    status: None,
                    reason: "network error".to_string(),
                });
            }
            Ok(Classification {
                category: self.answer.clone(),
                prompt: format!("classify {destination}"),
                response: self
                    .answer
                    .clone()
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::doubles::{FakeClassifier, FakeLedger};
    use super::*;
    use crate::jobs::JobStatus;
    use crate::webhook::JobSeed;
    use serde_json::json;

    fn seed() -> JobSeed {
        JobSeed {
            destination_name: "Coffee Shop".to_string(),
            description: "COFFEE SHOP".to_string(),
            transaction_id: json!(42),
            transactions: Vec::new(),
        }
    }

    fn pipeline(
        ledger: FakeLedger,
        classifier: FakeClassifier,
    ) -> (Pipeline, Arc<JobStore>, Arc<EventHub>) {
        let store = Arc::new(JobStore::new());
        let hub = Arc::new(EventHub::new());
        let pipeline = Pipeline::new(
            Arc::clone(&store),
            Arc::new(ledger),
            Arc::new(classifier),
            Arc::clone(&hub),
        );
        (pipeline, store, hub)
    }

    #[tokio::test]
    async fn test_match_assigns_and_finishes() {
        let ledger = FakeLedger::with_catalog(&[("Food & Drink", "7")]);
        let (pipeline, store, _hub) =
            pipeline(ledger, FakeClassifier::answering("Food & Drink"));
        let job = store.create_job(seed()).await;

        pipeline.process(job.id).await.unwrap();

        let done = store.get_job(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Finished);
        assert_eq!(done.data["category"], json!("Food & Drink"));
        assert!(done.data["prompt"].as_str().unwrap().contains("Coffee Shop"));
    }

    #[tokio::test]
    async fn test_decline_parks_for_operator() {
        let ledger = FakeLedger::with_catalog(&[("Groceries", "3")]);
        let (pipeline, store, hub) = pipeline(ledger, FakeClassifier::declining());
        let job = store.create_job(seed()).await;

        let mut stream = Box::pin(hub.subscribe().unwrap());
        pipeline.process(job.id).await.unwrap();

        let parked = store.get_job(job.id).await.unwrap();
        assert_eq!(parked.status, JobStatus::HumanInput);
        assert_eq!(parked.data["category"], json!(null));
        assert_eq!(parked.data["categories"], json!(["Groceries"]));

        // Drain until the operator prompt arrives.
        loop {
            match futures::StreamExt::next(&mut stream).await.unwrap() {
                WsEvent::RequestCategoryInput {
                    transaction_id,
                    categories,
                    ..
                } => {
                    assert_eq!(transaction_id, json!(42));
                    assert_eq!(categories, vec!["Groceries".to_string()]);
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_off_catalog_answer_parks_too() {
        let ledger = FakeLedger::with_catalog(&[("Groceries", "3")]);
        let (pipeline, store, _hub) =
            pipeline(ledger, FakeClassifier::answering("Crypto Winnings"));
        let job = store.create_job(seed()).await;

        pipeline.process(job.id).await.unwrap();

        assert_eq!(
            store.get_job(job.id).await.unwrap().status,
            JobStatus::HumanInput
        );
    }

    #[tokio::test]
    async fn test_collaborator_failure_propagates() {
        let ledger = FakeLedger::with_catalog(&[("Groceries", "3")]);
        let (pipeline, store, _hub) = pipeline(ledger, FakeClassifier::failing());
        let job = store.create_job(seed()).await;

        let err = pipeline.process(job.id).await.unwrap_err();
        assert!(matches!(err, TaskError::Classify(_)));
        // The job is left in_progress; the queue worker records the failure.
        assert_eq!(
            store.get_job(job.id).await.unwrap().status,
            JobStatus::InProgress
        );
    }
}
