use crate::engine::outcome::FetchFailure;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// First-failure-wins latch shared by every worker in a run.
///
/// The first hard failure is captured together with the URL of the feed that
/// produced it and cancels the run-scoped token exactly once. Later failures
/// are logged and otherwise ignored.
#[derive(Clone)]
pub struct FailureLatch {
    inner: Arc<LatchInner>,
}

struct LatchInner {
    triggered: AtomicBool,
    run_token: CancellationToken,
    captured: Mutex<Option<CapturedFailure>>,
}

#[derive(Debug, Clone)]
pub struct CapturedFailure {
    pub url: String,
    pub cause: FetchFailure,
}

impl FailureLatch {
    pub fn new(run_token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(LatchInner {
                triggered: AtomicBool::new(false),
                run_token,
                captured: Mutex::new(None),
            }),
        }
    }

    /// Records a feed failure. Returns `true` if this call won the race and
    /// cancelled the run.
    pub fn trigger(&self, url: &str, cause: &FetchFailure) -> bool {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                url,
                error = %cause,
                "additional feed failure after the run was already cancelled"
            );
            return false;
        }

        tracing::error!(
            url,
            error = %cause,
            "feed fetch failed; cancelling the remaining batch"
        );

        {
            let mut slot = self
                .inner
                .captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(CapturedFailure {
                    url: url.to_owned(),
                    cause: cause.clone(),
                });
            }
        }

        self.inner.run_token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    pub fn captured(&self) -> Option<CapturedFailure> {
        self.inner
            .captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
