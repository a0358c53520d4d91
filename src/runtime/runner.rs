use crate::engine::{Reconciler, RunOutcome};
use crate::fetch::FetchFeed;
use crate::runtime::config::ReconcilerConfig;
use crate::store::{user_key, BatchStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const E_LOCATE_BATCH: i32 = 1;
pub const E_LOAD_BATCH: i32 = 2;
pub const E_SAVE_BATCH: i32 = 3;
pub const E_STARTUP: i32 = 4;
pub const E_FEED_FAILURE: i32 = 5;

/// How a session ended, as reported to the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The run succeeded, or was cancelled by an operator signal.
    Success,
    LocateBatch,
    LoadBatch,
    SaveBatch,
    /// Configuration or fetch client could not be set up.
    Startup,
    FeedFailure,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::LocateBatch => E_LOCATE_BATCH,
            ExitStatus::LoadBatch => E_LOAD_BATCH,
            ExitStatus::SaveBatch => E_SAVE_BATCH,
            ExitStatus::Startup => E_STARTUP,
            ExitStatus::FeedFailure => E_FEED_FAILURE,
        }
    }
}

/// Loads the batch for `user_id`, reconciles it, and persists it when the run
/// succeeded.
///
/// Failed and gracefully cancelled runs leave the stored batch untouched.
pub async fn run_session(
    user_id: &str,
    store: &dyn BatchStore,
    fetcher: Arc<dyn FetchFeed>,
    config: &ReconcilerConfig,
    shutdown: CancellationToken,
) -> ExitStatus {
    let key = user_key(user_id);
    tracing::info!(hash = %key, "user is ready");

    let location = match store.locate(&key) {
        Ok(location) => location,
        Err(err) => {
            tracing::error!(hash = %key, error = ?err, "could not locate user feed file");
            return finish(ExitStatus::LocateBatch);
        }
    };
    tracing::info!(path = %location.display(), "user feed file");

    let batch = match store.load(&location) {
        Ok(batch) => batch,
        Err(err) => {
            tracing::error!(
                path = %location.display(),
                error = ?err,
                "could not read user feed file"
            );
            return finish(ExitStatus::LoadBatch);
        }
    };

    let reconciler = Reconciler::new(config);
    let report = reconciler.run(batch, fetcher, shutdown).await;
    let new_entries = report.new_entries();

    let status = match report.outcome {
        RunOutcome::Success => {
            tracing::info!(path = %location.display(), "saving updates to");
            match store.save(&report.batch, &location) {
                Ok(()) => {
                    tracing::info!(
                        path = %location.display(),
                        new_entries,
                        "updates saved to"
                    );
                    ExitStatus::Success
                }
                Err(err) => {
                    tracing::error!(
                        path = %location.display(),
                        error = ?err,
                        "could not save user feed file"
                    );
                    ExitStatus::SaveBatch
                }
            }
        }
        RunOutcome::CancelledGracefully => {
            tracing::info!(skipped = report.skipped, "update cancelled; discarding run");
            ExitStatus::Success
        }
        RunOutcome::Failed { url, cause } => {
            tracing::error!(url = %url, error = %cause, "feed update failed; discarding run");
            ExitStatus::FeedFailure
        }
    };

    finish(status)
}

fn finish(status: ExitStatus) -> ExitStatus {
    tracing::info!(code = status.code(), "session done");
    status
}
