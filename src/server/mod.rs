//! HTTP/WebSocket transport over the core.
//!
//! Thin layer: handlers validate, delegate to the core components, and map
//! their errors onto status codes. Webhook callers only ever learn
//! accepted/rejected; job outcomes are observable through `/jobs` and the
//! WebSocket feed, never through the webhook response.

mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::cleanup::CleanupScheduler;
use crate::error::{JobError, ResolveError, ServerError};
use crate::events::EventHub;
use crate::jobs::JobStore;
use crate::queue::ProcessingQueue;
use crate::resolve::HumanInputResolver;
use crate::webhook::{WebhookPayload, WebhookValidator};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub queue: Arc<ProcessingQueue>,
    pub validator: Arc<WebhookValidator>,
    pub resolver: Arc<HumanInputResolver>,
    pub cleanup: Arc<CleanupScheduler>,
    pub hub: Arc<EventHub>,
}

/// Build the full router with state applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route("/jobs", get(jobs_handler))
        .route("/jobs/{id}/resolve", post(resolve_handler))
        .route("/admin/cleanup", post(cleanup_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The HTTP/WS server. Binds, serves, and shuts down gracefully.
pub struct Server {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server task.
    pub async fn start(&mut self, app: Router) -> Result<SocketAddr, ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr).await.map_err(|e| {
            ServerError::BindFailed {
                addr: self.addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::BindFailed {
            addr: self.addr.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!("listening on {local_addr}");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("server shutting down");
                })
                .await
            {
                tracing::error!("server error: {e}");
            }
        });

        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    job_id: Uuid,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    category: String,
}

#[derive(Debug, Serialize)]
struct CleanupResponse {
    deleted: usize,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

/// Accept or reject a ledger change notification.
///
/// Acceptance only means a job was queued; the outcome arrives over the
/// WebSocket feed later.
async fn webhook_handler(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    let seed = match state.validator.validate(&payload) {
        Ok(seed) => seed,
        Err(e) => {
            tracing::debug!(error = %e, "webhook rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let job = state.store.create_job(seed).await;
    state.queue.enqueue(job.id);

    (
        StatusCode::OK,
        Json(WebhookAck {
            job_id: job.id,
            status: "queued",
        }),
    )
        .into_response()
}

async fn jobs_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.jobs().await)
}

async fn resolve_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> impl IntoResponse {
    match state.resolver.resolve(id, &req.category).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => {
            // Every misuse of the endpoint is a plain 400: unknown job,
            // wrong state, or a category outside the catalog. Only a
            // failing ledger collaborator is the upstream's fault.
            let status = match &e {
                ResolveError::Job(_) => StatusCode::BAD_REQUEST,
                ResolveError::Ledger(_) => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Manual trigger of the retention sweep.
async fn cleanup_handler(State(state): State<AppState>) -> impl IntoResponse {
    let deleted = state.cleanup.sweep().await;
    Json(CleanupResponse { deleted })
}
