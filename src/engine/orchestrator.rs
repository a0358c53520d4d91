use super::limiter::{ConcurrencyLimiter, SlotGuard};
use super::outcome::{
    aggregate, FeedReport, FetchFailure, ReconciliationOutcome, RunOutcome, RunPhase, RunReport,
};
use super::worker::FeedWorker;
use crate::feed::{Batch, FeedDescriptor};
use crate::fetch::FetchFeed;
use crate::runtime::config::ReconcilerConfig;
use crate::runtime::failure::FailureLatch;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry, DEFAULT_METRICS_INTERVAL};
use anyhow::anyhow;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Dispatches every feed of a batch under a concurrency bound.
///
/// Feeds are launched in batch order. The first hard failure cancels the
/// run-scoped token, which stops dispatch and signals in-flight workers; an
/// external shutdown reaches the same token through its parent.
pub struct Reconciler {
    max_concurrent_fetches: usize,
    metrics_interval: Duration,
    telemetry: Mutex<Arc<Telemetry>>,
    phase: watch::Sender<RunPhase>,
}

struct WorkerResult {
    index: usize,
    descriptor: FeedDescriptor,
    outcome: ReconciliationOutcome,
}

struct LaunchedFeed {
    index: usize,
    url: String,
    handle: JoinHandle<WorkerResult>,
}

impl Reconciler {
    pub fn new(config: &ReconcilerConfig) -> Self {
        Self::build(config.max_concurrent_fetches(), config.metrics_interval())
    }

    /// Reconciler with the given concurrency bound and default metrics interval.
    pub fn with_capacity(max_concurrent_fetches: usize) -> Self {
        Self::build(max_concurrent_fetches, DEFAULT_METRICS_INTERVAL)
    }

    fn build(max_concurrent_fetches: usize, metrics_interval: Duration) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            metrics_interval,
            telemetry: Mutex::new(Arc::new(Telemetry::default())),
            phase,
        }
    }

    /// Counters of the current run, or of the last one once it has finished.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Reconciles every feed in `batch` and returns the batch in its original
    /// order together with the aggregated outcome.
    ///
    /// Descriptors that were never launched are returned unmodified. The
    /// returned batch is only safe to persist when the outcome is
    /// [`RunOutcome::Success`].
    pub async fn run(
        &self,
        batch: Batch,
        fetcher: Arc<dyn FetchFeed>,
        shutdown: CancellationToken,
    ) -> RunReport {
        let Batch { version, items } = batch;
        let total = items.len();

        let run_token = shutdown.child_token();
        let latch = FailureLatch::new(run_token.clone());
        let telemetry = Arc::new(Telemetry::default());
        *self.telemetry.lock().unwrap_or_else(PoisonError::into_inner) = telemetry.clone();
        let limiter = ConcurrencyLimiter::new(self.max_concurrent_fetches, telemetry.clone());

        let reporter_stop = CancellationToken::new();
        let reporter = spawn_metrics_reporter(
            telemetry.clone(),
            reporter_stop.clone(),
            self.metrics_interval,
        );

        tracing::info!(
            feeds = total,
            max_concurrent_fetches = limiter.capacity(),
            "starting reconciliation run"
        );
        self.set_phase(RunPhase::Dispatching);

        let mut slots: Vec<Option<FeedDescriptor>> = Vec::with_capacity(total);
        let mut launched = Vec::with_capacity(total);
        let mut skipped = 0usize;
        let mut dispatching = true;

        for (index, descriptor) in items.into_iter().enumerate() {
            if dispatching {
                match limiter.acquire(&run_token).await {
                    Some(slot) => {
                        launched.push(launch(
                            index,
                            descriptor,
                            slot,
                            fetcher.clone(),
                            run_token.clone(),
                            latch.clone(),
                            telemetry.clone(),
                        ));
                        slots.push(None);
                        continue;
                    }
                    None => {
                        dispatching = false;
                        tracing::info!(
                            launched = index,
                            remaining = total - index,
                            "run cancelled; leaving remaining feeds untouched"
                        );
                    }
                }
            }
            skipped += 1;
            slots.push(Some(descriptor));
        }

        telemetry.record_skipped(skipped);
        self.set_phase(RunPhase::AllLaunched);
        self.set_phase(RunPhase::Draining);

        let (meta, handles): (Vec<_>, Vec<_>) = launched
            .into_iter()
            .map(|feed| ((feed.index, feed.url), feed.handle))
            .unzip();
        let results = join_all(handles).await;

        let mut feeds = Vec::with_capacity(results.len());
        for ((index, url), result) in meta.into_iter().zip(results) {
            match result {
                Ok(WorkerResult {
                    index,
                    descriptor,
                    outcome,
                }) => {
                    feeds.push(FeedReport {
                        index,
                        url: descriptor.url().to_owned(),
                        outcome,
                    });
                    slots[index] = Some(descriptor);
                }
                Err(err) => {
                    // The descriptor went down with the task; the run is
                    // failed so the batch is never persisted.
                    let cause = FetchFailure::new(anyhow!("feed worker task aborted: {err}"));
                    telemetry.record_failed();
                    latch.trigger(&url, &cause);
                    feeds.push(FeedReport {
                        index,
                        url,
                        outcome: ReconciliationOutcome::Failed(cause),
                    });
                }
            }
        }
        feeds.sort_by_key(|feed| feed.index);

        let outcome = aggregate(&feeds, skipped, latch.captured());

        reporter_stop.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task failed");
        }

        let snapshot = telemetry.snapshot();
        match &outcome {
            RunOutcome::Success => tracing::info!(
                feeds = total,
                updated = snapshot.feeds_updated,
                unchanged = snapshot.feeds_unchanged,
                new_entries = snapshot.new_entries,
                peak_in_flight = snapshot.peak_in_flight,
                "reconciliation run finished"
            ),
            RunOutcome::Failed { url, cause } => tracing::error!(
                url = %url,
                error = %cause,
                failed = snapshot.feeds_failed,
                cancelled = snapshot.feeds_cancelled,
                skipped,
                "reconciliation run failed"
            ),
            RunOutcome::CancelledGracefully => tracing::info!(
                cancelled = snapshot.feeds_cancelled,
                skipped,
                "reconciliation run cancelled"
            ),
        }
        self.set_phase(outcome.phase());

        RunReport {
            batch: Batch {
                version,
                items: slots.into_iter().flatten().collect(),
            },
            outcome,
            feeds,
            skipped,
        }
    }

    fn set_phase(&self, phase: RunPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::debug!(from = ?previous, to = ?phase, "run phase changed");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn launch(
    index: usize,
    descriptor: FeedDescriptor,
    slot: SlotGuard,
    fetcher: Arc<dyn FetchFeed>,
    run_token: CancellationToken,
    latch: FailureLatch,
    telemetry: Arc<Telemetry>,
) -> LaunchedFeed {
    let url = descriptor.url().to_owned();
    telemetry.record_launched();

    let handle = tokio::spawn(async move {
        let mut descriptor = descriptor;
        let worker = FeedWorker::new(index);
        let result = AssertUnwindSafe(worker.reconcile(
            &mut descriptor,
            fetcher.as_ref(),
            &run_token,
        ))
        .catch_unwind()
        .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    worker = index,
                    url = descriptor.url(),
                    panic = %message,
                    "feed worker panicked"
                );
                ReconciliationOutcome::Failed(FetchFailure::new(anyhow!(
                    "feed worker panicked: {message}"
                )))
            }
        };

        match &outcome {
            ReconciliationOutcome::Unchanged => telemetry.record_unchanged(),
            ReconciliationOutcome::Updated(count) => telemetry.record_updated(*count),
            ReconciliationOutcome::Cancelled => telemetry.record_cancelled(),
            ReconciliationOutcome::Failed(cause) => {
                telemetry.record_failed();
                latch.trigger(descriptor.url(), cause);
            }
        }

        // The run token must already be cancelled when a failed worker
        // frees its slot, otherwise the dispatcher could launch another feed.
        drop(slot);

        WorkerResult {
            index,
            descriptor,
            outcome,
        }
    });

    LaunchedFeed { index, url, handle }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
