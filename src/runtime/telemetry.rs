use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Run counters shared by the orchestrator, limiter, and workers.
#[derive(Default, Debug)]
pub struct Telemetry {
    feeds_launched: AtomicU64,
    feeds_unchanged: AtomicU64,
    feeds_updated: AtomicU64,
    feeds_cancelled: AtomicU64,
    feeds_failed: AtomicU64,
    feeds_skipped: AtomicU64,
    new_entries: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Telemetry {
    pub fn record_launched(&self) {
        self.feeds_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.feeds_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_updated(&self, new_entries: usize) {
        self.feeds_updated.fetch_add(1, Ordering::Relaxed);
        self.new_entries
            .fetch_add(new_entries as u64, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.feeds_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.feeds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.feeds_skipped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn enter_slot(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    pub(crate) fn leave_slot(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            feeds_launched: self.feeds_launched.load(Ordering::Relaxed),
            feeds_unchanged: self.feeds_unchanged.load(Ordering::Relaxed),
            feeds_updated: self.feeds_updated.load(Ordering::Relaxed),
            feeds_cancelled: self.feeds_cancelled.load(Ordering::Relaxed),
            feeds_failed: self.feeds_failed.load(Ordering::Relaxed),
            feeds_skipped: self.feeds_skipped.load(Ordering::Relaxed),
            new_entries: self.new_entries.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub feeds_launched: u64,
    pub feeds_unchanged: u64,
    pub feeds_updated: u64,
    pub feeds_cancelled: u64,
    pub feeds_failed: u64,
    pub feeds_skipped: u64,
    pub new_entries: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl TelemetrySnapshot {
    pub fn completed(&self) -> u64 {
        self.feeds_unchanged
            .saturating_add(self.feeds_updated)
            .saturating_add(self.feeds_cancelled)
            .saturating_add(self.feeds_failed)
    }
}

/// Spawns a background task that periodically logs run progress until `shutdown` fires.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first report
        // covers a full interval.
        ticker.tick().await;

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "sputnik::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let completed_delta = current
                        .completed()
                        .saturating_sub(last_snapshot.completed());
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        completed_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "sputnik::metrics",
                        throughput = format!("{throughput:.2}"),
                        launched = current.feeds_launched,
                        completed = current.completed(),
                        in_flight = current.in_flight,
                        new_entries = current.new_entries,
                        failed = current.feeds_failed,
                        "reconciliation progress"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
