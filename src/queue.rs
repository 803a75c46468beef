//! FIFO processing queue with a single worker.
//!
//! Classification is a rate-limited external call; running one task at a
//! time protects the quota and keeps catalog reads consistent with the
//! in-flight assignment writes. Submission order is preserved exactly; there
//! is no retry, no priority, and no cancellation of queued items. The only
//! bound is the per-task wall-clock timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::jobs::JobStore;
use crate::pipeline::Pipeline;

/// Handle to the single-worker task queue.
pub struct ProcessingQueue {
    tx: mpsc::UnboundedSender<Uuid>,
    worker: JoinHandle<()>,
}

impl ProcessingQueue {
    /// Spawn the worker and return the enqueue handle.
    pub fn start(pipeline: Arc<Pipeline>, store: Arc<JobStore>, task_timeout: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Uuid>();

        let worker = tokio::spawn(async move {
            while let Some(job_id) = rx.recv().await {
                match tokio::time::timeout(task_timeout, pipeline.process(job_id)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        // Contained per task: the job fails, the worker and
                        // the rest of the queue keep going.
                        tracing::error!(job_id = %job_id, error = %e, "task failed");
                        store.set_failed(job_id, e.to_string()).await;
                    }
                    Err(_) => {
                        tracing::error!(job_id = %job_id, ?task_timeout, "task timed out");
                        store
                            .set_failed(
                                job_id,
                                format!("task timed out after {}s", task_timeout.as_secs()),
                            )
                            .await;
                    }
                }
            }
            tracing::debug!("processing queue drained, worker exiting");
        });

        Self { tx, worker }
    }

    /// Append a job to the queue. Strict FIFO; returns whether the worker
    /// was still accepting work.
    pub fn enqueue(&self, job_id: Uuid) -> bool {
        match self.tx.send(job_id) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(job_id = %job_id, "enqueue after worker shutdown");
                false
            }
        }
    }

    /// Stop accepting work and wait for queued tasks to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Classification, Classifier};
    use crate::error::ClassifyError;
    use crate::events::EventHub;
    use crate::jobs::JobStatus;
    use crate::pipeline::doubles::{FakeClassifier, FakeLedger};
    use crate::webhook::JobSeed;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seed(n: u64) -> JobSeed {
        JobSeed {
            destination_name: format!("Shop {n}"),
            description: format!("SHOP {n}"),
            transaction_id: json!(n),
            transactions: Vec::new(),
        }
    }

    /// Classifier that records call order and asserts it is never re-entered.
    struct SerializingClassifier {
        order: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for SerializingClassifier {
        async fn classify(
            &self,
            _categories: &[String],
            destination: &str,
            _description: &str,
        ) -> Result<Classification, ClassifyError> {
            let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst);
            assert_eq!(concurrent, 0, "queue ran two tasks concurrently");

            tokio::time::sleep(Duration::from_millis(10)).await;
            self.order.lock().unwrap().push(destination.to_string());

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Classification {
                category: Some("Groceries".to_string()),
                prompt: "p".to_string(),
                response: "Groceries".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_fifo_order_and_single_concurrency() {
        let store = Arc::new(JobStore::new());
        let hub = Arc::new(EventHub::new());
        let classifier = Arc::new(SerializingClassifier {
            order: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            Arc::new(FakeLedger::with_catalog(&[("Groceries", "3")])),
            Arc::clone(&classifier) as Arc<dyn Classifier>,
            hub,
        ));

        let queue = ProcessingQueue::start(pipeline, Arc::clone(&store), Duration::from_secs(5));

        let mut ids = Vec::new();
        for n in 0..5 {
            let job = store.create_job(seed(n)).await;
            queue.enqueue(job.id);
            ids.push(job.id);
        }

        queue.shutdown().await;

        let order = classifier.order.lock().unwrap().clone();
        assert_eq!(
            order,
            (0..5).map(|n| format!("Shop {n}")).collect::<Vec<_>>()
        );
        for id in ids {
            assert_eq!(store.get_job(id).await.unwrap().status, JobStatus::Finished);
        }
    }

    #[tokio::test]
    async fn test_task_error_fails_job_but_not_queue() {
        let store = Arc::new(JobStore::new());
        let hub = Arc::new(EventHub::new());

        // Every task hits a ledger whose catalog fetch fails.
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            Arc::new(FakeLedger {
                fail_fetch: true,
                ..FakeLedger::default()
            }),
            Arc::new(FakeClassifier::answering("Groceries")),
            hub,
        ));

        let queue = ProcessingQueue::start(pipeline, Arc::clone(&store), Duration::from_secs(5));

        let first = store.create_job(seed(1)).await;
        let second = store.create_job(seed(2)).await;
        queue.enqueue(first.id);
        queue.enqueue(second.id);
        queue.shutdown().await;

        // Both failed individually; the worker survived the first failure
        // and still processed the second.
        for id in [first.id, second.id] {
            let job = store.get_job(id).await.unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            assert!(
                job.data["errorMessage"]
                    .as_str()
                    .unwrap()
                    .contains("connection refused")
            );
        }
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let store = Arc::new(JobStore::new());
        let hub = Arc::new(EventHub::new());
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            Arc::new(FakeLedger::with_catalog(&[("Groceries", "3")])),
            Arc::new(FakeClassifier {
                answer: Some("Groceries".to_string()),
                fail: false,
                delay: Duration::from_secs(60),
            }),
            hub,
        ));

        let queue =
            ProcessingQueue::start(pipeline, Arc::clone(&store), Duration::from_millis(50));

        let job = store.create_job(seed(1)).await;
        queue.enqueue(job.id);
        queue.shutdown().await;

        let failed = store.get_job(job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(
            failed.data["errorMessage"]
                .as_str()
                .unwrap()
                .contains("timed out")
        );
    }
}
