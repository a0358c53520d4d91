use super::outcome::ReconciliationOutcome;
use crate::feed::{FeedDescriptor, RemoteEntry, UnprocessedEntry};
use crate::fetch::FetchFeed;
use tokio_util::sync::CancellationToken;

const LOGGED_TITLE_CHARS: usize = 64;

/// Performs one fetch-and-diff pass for a single feed.
#[derive(Debug, Clone, Copy)]
pub struct FeedWorker {
    id: usize,
}

impl FeedWorker {
    pub fn new(id: usize) -> Self {
        Self { id }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Fetches `feed`, compares the freshness token against the stored cursor
    /// and records any unseen entries.
    ///
    /// The descriptor is left untouched unless the fetch succeeded with a new
    /// token. Once the cursor is advanced, entries are walked in remote order
    /// and cancellation is checked before each one; stopping early keeps
    /// whatever was already recorded.
    pub async fn reconcile(
        &self,
        feed: &mut FeedDescriptor,
        fetcher: &dyn FetchFeed,
        cancel: &CancellationToken,
    ) -> ReconciliationOutcome {
        self.reconcile_observed(feed, fetcher, cancel, |_| {}).await
    }

    /// Same as [`FeedWorker::reconcile`], calling `on_recorded` right after each
    /// entry is appended to the unprocessed queue.
    pub(crate) async fn reconcile_observed<F>(
        &self,
        feed: &mut FeedDescriptor,
        fetcher: &dyn FetchFeed,
        cancel: &CancellationToken,
        mut on_recorded: F,
    ) -> ReconciliationOutcome
    where
        F: FnMut(&UnprocessedEntry),
    {
        if cancel.is_cancelled() {
            tracing::debug!(
                worker = self.id,
                url = feed.url(),
                "skipping feed; run cancelled"
            );
            return ReconciliationOutcome::Cancelled;
        }

        tracing::info!(
            worker = self.id,
            url = feed.url(),
            cursor = feed.cursor(),
            "processing feed"
        );

        let snapshot = match fetcher.fetch(feed.url(), cancel).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_cancellation() => {
                tracing::info!(
                    worker = self.id,
                    url = feed.url(),
                    "feed reconciliation cancelled"
                );
                return ReconciliationOutcome::Cancelled;
            }
            Err(err) => {
                tracing::debug!(
                    worker = self.id,
                    url = feed.url(),
                    error = %err,
                    "feed fetch failed"
                );
                return ReconciliationOutcome::Failed(err.into());
            }
        };

        if snapshot.freshness_token == feed.cursor() {
            tracing::info!(worker = self.id, url = feed.url(), "no new items");
            return ReconciliationOutcome::Unchanged;
        }

        tracing::info!(
            worker = self.id,
            url = feed.url(),
            updated = %snapshot.freshness_token,
            entries = snapshot.entries.len(),
            "got updates"
        );
        feed.advance_cursor(snapshot.freshness_token);

        let mut new_entries = 0;
        for entry in snapshot.entries {
            if cancel.is_cancelled() {
                tracing::info!(
                    worker = self.id,
                    url = feed.url(),
                    new_entries,
                    "feed reconciliation cancelled"
                );
                return ReconciliationOutcome::Cancelled;
            }

            let RemoteEntry {
                identifier,
                title,
                locator,
                updated_at,
            } = entry;
            if feed.identities().contains(&identifier) {
                continue;
            }

            tracing::debug!(
                worker = self.id,
                guid = %identifier,
                title = first_n_chars(&title, LOGGED_TITLE_CHARS),
                updated = %updated_at,
                "new entry"
            );
            if feed.record_entry(identifier, locator) {
                new_entries += 1;
                if let Some(recorded) = feed.unprocessed().last() {
                    on_recorded(recorded);
                }
            }
        }

        tracing::info!(
            worker = self.id,
            url = feed.url(),
            new_entries,
            "total new entries"
        );
        ReconciliationOutcome::Updated(new_entries)
    }
}

fn first_n_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
