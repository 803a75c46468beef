//! Error types for all subsystems.

use uuid::Uuid;

use crate::jobs::JobStatus;

/// Webhook payload rejection reasons, checked in order.
///
/// Each variant maps to one validation rule; the first violated rule wins
/// and is reported to the webhook caller as a 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported trigger '{trigger}', expected UPDATE_TRANSACTION")]
    WrongTrigger { trigger: String },

    #[error("unsupported response '{response}', expected TRANSACTIONS")]
    WrongResponse { response: String },

    #[error("webhook contains no transactions")]
    NoTransactions,

    #[error("transaction type '{kind}' is not categorizable")]
    UnsupportedType { kind: String },

    #[error("transaction already has a category assigned")]
    AlreadyCategorized,

    #[error("transaction is missing '{field}'")]
    MissingField { field: &'static str },
}

/// Job registry and resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job {id} not found")]
    NotFound { id: Uuid },

    #[error("job {id} is {status}, expected {expected}")]
    InvalidState {
        id: Uuid,
        status: JobStatus,
        expected: JobStatus,
    },

    #[error("category '{name}' is not in the ledger catalog")]
    UnknownCategory { name: String },
}

/// Ledger collaborator failures (category catalog, category assignment).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger request failed{}: {reason}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RequestFailed { status: Option<u16>, reason: String },

    #[error("ledger returned an invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// Classifier collaborator failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier request failed{}: {reason}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RequestFailed { status: Option<u16>, reason: String },

    #[error("classifier returned an invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// Everything that can sink a single pipeline task.
///
/// Contained at the queue worker: a task error marks its job `Failed` and
/// never propagates past the worker loop.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Human-input resolution failures, surfaced to the HTTP caller.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Server startup failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {reason}")]
    BindFailed { addr: String, reason: String },
}
