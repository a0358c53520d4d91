use crate::feed::Batch;
use crate::fetch::FetchError;
use crate::runtime::failure::CapturedFailure;
use anyhow::Error as AnyError;
use std::fmt;
use std::sync::Arc;

/// Cloneable cause of a hard feed failure.
#[derive(Clone)]
pub struct FetchFailure {
    inner: Arc<AnyError>,
}

impl FetchFailure {
    pub fn new(inner: AnyError) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl From<FetchError> for FetchFailure {
    fn from(err: FetchError) -> Self {
        Self::new(err.into())
    }
}

impl fmt::Debug for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FetchFailure").field(&self.inner).finish()
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for FetchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref().as_ref())
    }
}

/// Result of one worker pass over one feed.
#[derive(Debug, Clone)]
pub enum ReconciliationOutcome {
    Unchanged,
    Updated(usize),
    Cancelled,
    Failed(FetchFailure),
}

impl ReconciliationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReconciliationOutcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconciliationOutcome::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Unchanged => "unchanged",
            ReconciliationOutcome::Updated(_) => "updated",
            ReconciliationOutcome::Cancelled => "cancelled",
            ReconciliationOutcome::Failed(_) => "failed",
        }
    }
}

/// Batch-level classification handed back to the caller.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Success,
    Failed { url: String, cause: FetchFailure },
    CancelledGracefully,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }

    pub fn is_cancelled_gracefully(&self) -> bool {
        matches!(self, RunOutcome::CancelledGracefully)
    }

    pub fn phase(&self) -> RunPhase {
        match self {
            RunOutcome::Success => RunPhase::Success,
            RunOutcome::Failed { .. } => RunPhase::Failed,
            RunOutcome::CancelledGracefully => RunPhase::CancelledGracefully,
        }
    }
}

/// Lifecycle of a single reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Dispatching,
    AllLaunched,
    Draining,
    Success,
    Failed,
    CancelledGracefully,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Success | RunPhase::Failed | RunPhase::CancelledGracefully
        )
    }
}

/// Outcome of one launched feed, keyed by its position in the batch.
#[derive(Debug, Clone)]
pub struct FeedReport {
    pub index: usize,
    pub url: String,
    pub outcome: ReconciliationOutcome,
}

/// Everything a run hands back: the (possibly partially mutated) batch, the
/// batch-level outcome, per-feed reports sorted by batch position, and the
/// number of descriptors never launched.
#[derive(Debug)]
pub struct RunReport {
    pub batch: Batch,
    pub outcome: RunOutcome,
    pub feeds: Vec<FeedReport>,
    pub skipped: usize,
}

impl RunReport {
    pub fn new_entries(&self) -> usize {
        self.feeds
            .iter()
            .map(|feed| match feed.outcome {
                ReconciliationOutcome::Updated(count) => count,
                _ => 0,
            })
            .sum()
    }
}

/// Resolves the batch outcome with priority `Failed` > `CancelledGracefully` > `Success`.
///
/// A captured first failure is preferred as the reported cause; otherwise the
/// lowest-index failed feed is used.
pub(crate) fn aggregate(
    feeds: &[FeedReport],
    skipped: usize,
    first_failure: Option<CapturedFailure>,
) -> RunOutcome {
    let failed = feeds.iter().find_map(|feed| match &feed.outcome {
        ReconciliationOutcome::Failed(cause) => Some((feed.url.clone(), cause.clone())),
        _ => None,
    });

    if let Some((url, cause)) = failed {
        return match first_failure {
            Some(captured) => RunOutcome::Failed {
                url: captured.url,
                cause: captured.cause,
            },
            None => RunOutcome::Failed { url, cause },
        };
    }

    if skipped > 0 || feeds.iter().any(|feed| feed.outcome.is_cancelled()) {
        return RunOutcome::CancelledGracefully;
    }

    RunOutcome::Success
}
