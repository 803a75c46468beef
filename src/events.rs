//! Live event hub for real-time observers.
//!
//! Bridges `JobStore` lifecycle events onto a broadcast channel that
//! WebSocket connections subscribe to. Delivery is fire-and-forget: a slow
//! or disconnected observer drops events and never blocks store mutation or
//! queue progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::jobs::{Job, JobEvent, JobStore};

/// Maximum concurrent WebSocket observers.
const MAX_CONNECTIONS: u64 = 100;

/// Buffered events per subscriber; laggards drop, never block.
const EVENT_BUFFER: usize = 256;

/// Events delivered to real-time observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum WsEvent {
    /// Full snapshot, sent once when an observer connects.
    #[serde(rename = "jobs")]
    Jobs { jobs: Vec<Job> },
    #[serde(rename = "job created")]
    JobCreated { job: Job, jobs: Vec<Job> },
    #[serde(rename = "job updated")]
    JobUpdated { job: Job, jobs: Vec<Job> },
    #[serde(rename = "job deleted")]
    JobDeleted { id: Uuid, jobs: Vec<Job> },
    /// A job parked in `human_input`; the UI should ask the operator.
    #[serde(rename = "request-category-input")]
    RequestCategoryInput {
        #[serde(rename = "transactionId")]
        transaction_id: Value,
        description: String,
        prompt: String,
        categories: Vec<String>,
    },
}

impl From<JobEvent> for WsEvent {
    fn from(event: JobEvent) -> Self {
        match event {
            JobEvent::Created { job, jobs } => WsEvent::JobCreated { job, jobs },
            JobEvent::Updated { job, jobs } => WsEvent::JobUpdated { job, jobs },
            JobEvent::Deleted { id, jobs } => WsEvent::JobDeleted { id, jobs },
        }
    }
}

/// Fan-out point for observer events.
pub struct EventHub {
    tx: broadcast::Sender<WsEvent>,
    connection_count: Arc<AtomicU64>,
    max_connections: u64,
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            tx,
            connection_count: Arc::new(AtomicU64::new(0)),
            max_connections: MAX_CONNECTIONS,
        }
    }

    /// Publish an event to all observers. No-op without subscribers.
    pub fn publish(&self, event: WsEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of connected observers.
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Subscribe as an observer, counted against the connection cap.
    ///
    /// Returns `None` when the cap is reached. The count decrements when the
    /// returned stream drops.
    pub fn subscribe(&self) -> Option<impl Stream<Item = WsEvent> + Send + 'static + use<>> {
        // Increment only if below the limit so concurrent connects cannot
        // overshoot the cap.
        let counter = Arc::clone(&self.connection_count);
        let max = self.max_connections;
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                if current < max { Some(current + 1) } else { None }
            })
            .ok()?;

        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());

        Some(CountedStream {
            inner: stream,
            counter,
        })
    }

    /// Spawn the task that republishes store events to observers.
    pub fn spawn_bridge(&self, store: &JobStore) -> tokio::task::JoinHandle<()> {
        let tx = self.tx.clone();
        let mut events = store.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let _ = tx.send(event.into());
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "event bridge lagged, jobs snapshot self-heals");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that decrements the connection count on drop.
struct CountedStream<S> {
    inner: S,
    counter: Arc<AtomicU64>,
}

impl<S: Stream + Unpin> Stream for CountedStream<S> {
    type Item = S::Item;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CountedStream<S> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
