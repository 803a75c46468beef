//! ledgersift: LLM-backed transaction categorization for a ledger service.
//!
//! The ledger fires a webhook on every transaction change; valid,
//! uncategorized withdrawals and deposits become jobs in an in-memory
//! registry. A single-worker queue classifies each job against the ledger's
//! category catalog via an LLM, writes the category back, and publishes
//! every lifecycle step to WebSocket observers. Jobs the classifier cannot
//! decide wait for an operator; old terminal jobs are swept on a schedule.

pub mod classify;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod ledger;
pub mod normalize;
pub mod pipeline;
pub mod queue;
pub mod resolve;
pub mod server;
pub mod webhook;
