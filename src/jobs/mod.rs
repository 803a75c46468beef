//! Job registry: records, state machine, and lifecycle events.

mod events;
mod job;
mod store;

pub use events::JobEvent;
pub use job::{Job, JobStatus};
pub use store::JobStore;
