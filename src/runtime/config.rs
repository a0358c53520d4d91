use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 5;
pub const DEFAULT_DATA_DIR: &str = "./.sputnik";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_FEED_BYTES: usize = 10 * BYTES_PER_MEGABYTE;
const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

/// Runtime configuration for a reconciliation session.
///
/// All instances must be constructed via [`ReconcilerConfig::builder`] or
/// [`ReconcilerConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    max_concurrent_fetches: usize,
    fetch_timeout: Duration,
    max_feed_bytes: usize,
    metrics_interval: Duration,
    data_dir: PathBuf,
    user_agent: String,
}

pub struct ReconcilerConfigParams {
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
    pub max_feed_bytes: usize,
    pub metrics_interval: Duration,
    pub data_dir: PathBuf,
    pub user_agent: String,
}

impl ReconcilerConfig {
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }

    pub fn new(params: ReconcilerConfigParams) -> Result<Self> {
        let ReconcilerConfigParams {
            max_concurrent_fetches,
            fetch_timeout,
            max_feed_bytes,
            metrics_interval,
            data_dir,
            user_agent,
        } = params;

        let config = Self {
            max_concurrent_fetches,
            fetch_timeout,
            max_feed_bytes,
            metrics_interval,
            data_dir,
            user_agent: user_agent.trim().to_owned(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `SPUTNIK_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::builder().apply_env()?.build()
    }

    /// Capacity of the concurrency limiter.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_concurrent_fetches
    }

    /// Per-request timeout applied by the HTTP fetcher.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Largest feed body accepted by the HTTP fetcher.
    pub fn max_feed_bytes(&self) -> usize {
        self.max_feed_bytes
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Root directory holding persisted batches.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            bail!("max_concurrent_fetches must be greater than 0");
        }

        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be greater than 0");
        }

        if self.max_feed_bytes == 0 {
            bail!("max_feed_bytes must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.data_dir.as_os_str().is_empty() {
            bail!("data_dir cannot be empty");
        }

        if self.user_agent.is_empty() {
            bail!("user_agent cannot be empty");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReconcilerConfigBuilder {
    max_concurrent_fetches: Option<usize>,
    fetch_timeout: Option<Duration>,
    max_feed_bytes: Option<usize>,
    metrics_interval: Option<Duration>,
    data_dir: Option<PathBuf>,
    user_agent: Option<String>,
}

impl ReconcilerConfigBuilder {
    pub fn max_concurrent_fetches(mut self, count: usize) -> Self {
        self.max_concurrent_fetches = Some(count);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn max_feed_bytes(mut self, bytes: usize) -> Self {
        self.max_feed_bytes = Some(bytes);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Overlays any `SPUTNIK_*` environment variables onto the builder.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(count) = parse_env::<usize>("SPUTNIK_MAX_CONCURRENCY")? {
            self.max_concurrent_fetches = Some(count);
        }
        if let Some(secs) = parse_env::<u64>("SPUTNIK_FETCH_TIMEOUT_SECS")? {
            self.fetch_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(mb) = parse_env::<usize>("SPUTNIK_MAX_FEED_MB")? {
            self.max_feed_bytes = Some(mb.saturating_mul(BYTES_PER_MEGABYTE));
        }
        if let Some(secs) = parse_env::<u64>("SPUTNIK_METRICS_INTERVAL_SECS")? {
            self.metrics_interval = Some(Duration::from_secs(secs));
        }
        if let Some(dir) = read_env("SPUTNIK_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(agent) = read_env("SPUTNIK_USER_AGENT") {
            self.user_agent = Some(agent);
        }
        Ok(self)
    }

    pub fn build(self) -> Result<ReconcilerConfig> {
        let params = ReconcilerConfigParams {
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
            fetch_timeout: self
                .fetch_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)),
            max_feed_bytes: self.max_feed_bytes.unwrap_or(DEFAULT_MAX_FEED_BYTES),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            data_dir: self
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
        };

        ReconcilerConfig::new(params)
    }
}

fn default_user_agent() -> String {
    format!("sputnik/{}", env!("CARGO_PKG_VERSION"))
}

fn read_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    read_env(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("{name} must be a valid number, got {value:?}"))
        })
        .transpose()
}
