//! Concurrent reconciliation engine.
//!
//! - `limiter` bounds the number of in-flight fetches with a counting
//!   semaphore whose slots are released on drop.
//! - `worker` performs one fetch-and-diff pass for a single feed.
//! - `orchestrator` dispatches a whole batch, propagates first-failure
//!   cancellation, and aggregates per-feed outcomes.
//! - `outcome` holds the per-feed and per-run result types.

pub mod limiter;
pub mod orchestrator;
pub mod outcome;
pub mod worker;

pub use limiter::{ConcurrencyLimiter, SlotGuard};
pub use orchestrator::Reconciler;
pub use outcome::{
    FeedReport, FetchFailure, ReconciliationOutcome, RunOutcome, RunPhase, RunReport,
};
pub use worker::FeedWorker;
