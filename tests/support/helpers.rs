use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use sputnik::{
    user_key, Batch, BatchStore, FeedDescriptor, FetchError, FetchFeed, RemoteEntry,
    RemoteFeedSnapshot,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// What a scripted feed returns once its delay has elapsed.
#[derive(Clone, Debug)]
pub enum Reply {
    Snapshot(RemoteFeedSnapshot),
    Status(u16),
    Timeout,
}

#[derive(Clone, Debug)]
pub struct FeedScript {
    pub delay: Duration,
    pub reply: Reply,
}

impl FeedScript {
    pub fn snapshot(token: &str, guids: &[&str]) -> Self {
        let entries = guids
            .iter()
            .map(|guid| {
                RemoteEntry::new(*guid, format!("http://example.com/item/{guid}"))
                    .with_title(format!("Entry {guid}"))
            })
            .collect();
        Self {
            delay: Duration::ZERO,
            reply: Reply::Snapshot(RemoteFeedSnapshot::new(token, entries)),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Reply::Status(status),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory [`FetchFeed`] that replays per-URL scripts and records how many
/// fetches were in flight at once.
pub struct ScriptedFetcher {
    scripts: HashMap<String, FeedScript>,
    fallback: FeedScript,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(fallback: FeedScript) -> Self {
        Self {
            scripts: HashMap::new(),
            fallback,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_script(mut self, url: impl Into<String>, script: FeedScript) -> Self {
        self.scripts.insert(url.into(), script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FetchFeed for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteFeedSnapshot, FetchError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(url.to_string());
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let script = self.scripts.get(url).unwrap_or(&self.fallback);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                _ = sleep(script.delay) => match &script.reply {
                    Reply::Snapshot(snapshot) => Ok(snapshot.clone()),
                    Reply::Status(status) => Err(FetchError::Status { status: *status }),
                    Reply::Timeout => Err(FetchError::Timeout),
                },
            }
        })
    }
}

/// [`BatchStore`] keyed by user key, used to observe what a session saves.
#[derive(Default)]
pub struct MemoryStore {
    batches: Mutex<HashMap<String, Batch>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with_user(user_id: &str, batch: Batch) -> Self {
        let store = Self::default();
        store
            .batches
            .lock()
            .unwrap()
            .insert(user_key(user_id), batch);
        store
    }

    pub fn batch_for(&self, user_id: &str) -> Option<Batch> {
        self.batches.lock().unwrap().get(&user_key(user_id)).cloned()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl BatchStore for MemoryStore {
    fn locate(&self, user_key: &str) -> Result<PathBuf> {
        if !self.batches.lock().unwrap().contains_key(user_key) {
            bail!("unknown user key {user_key}");
        }
        Ok(PathBuf::from(user_key))
    }

    fn load(&self, location: &Path) -> Result<Batch> {
        let key = location.to_string_lossy();
        self.batches
            .lock()
            .unwrap()
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| anyhow!("no batch at {key}"))
    }

    fn save(&self, batch: &Batch, location: &Path) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .insert(location.to_string_lossy().into_owned(), batch.clone());
        Ok(())
    }
}

pub fn feed_url(index: usize) -> String {
    format!("http://feeds.example.com/{index}.xml")
}

/// Batch of `count` feeds, each with cursor `T1`.
pub fn feed_batch(count: usize) -> Batch {
    Batch::new(
        "1",
        (0..count)
            .map(|index| FeedDescriptor::new(feed_url(index)).with_cursor("T1"))
            .collect(),
    )
}
