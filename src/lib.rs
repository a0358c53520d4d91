pub mod engine;
pub mod feed;
pub mod fetch;
pub mod runtime;
pub mod store;

pub use engine::{
    ConcurrencyLimiter, FeedReport, FeedWorker, FetchFailure, ReconciliationOutcome, Reconciler,
    RunOutcome, RunPhase, RunReport, SlotGuard,
};
pub use feed::{
    Batch, FeedDescriptor, IdentitySet, RemoteEntry, RemoteFeedSnapshot, UnprocessedEntry,
};
pub use fetch::{FetchError, FetchFeed, HttpFeedFetcher};
pub use runtime::config::{ReconcilerConfig, ReconcilerConfigBuilder, ReconcilerConfigParams};
pub use runtime::failure::{CapturedFailure, FailureLatch};
pub use runtime::runner::{run_session, ExitStatus};
pub use runtime::shutdown::shutdown_on_signals;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::{user_key, BatchStore, JsonFileStore};
