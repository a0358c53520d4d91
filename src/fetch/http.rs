//! HTTP implementation of [`FetchFeed`]: downloads with `reqwest`, enforces a
//! response size cap, and parses RSS 2.0 documents with the `rss` crate.

use super::{FetchError, FetchFeed};
use crate::feed::{RemoteEntry, RemoteFeedSnapshot};
use crate::runtime::config::ReconcilerConfig;
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    max_feed_bytes: usize,
}

impl FetchFeed for HttpFeedFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteFeedSnapshot, FetchError>> {
        Box::pin(self.fetch_snapshot(url, cancel))
    }
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration, max_feed_bytes: usize, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            max_feed_bytes,
        })
    }

    pub fn from_config(config: &ReconcilerConfig) -> Result<Self> {
        Self::new(
            config.fetch_timeout(),
            config.max_feed_bytes(),
            config.user_agent(),
        )
    }

    pub async fn fetch_snapshot(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteFeedSnapshot, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            body = self.download(url) => parse_channel(&body?),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let limit = self.max_feed_bytes;
        if let Some(length) = response.content_length() {
            if length > limit as u64 {
                return Err(FetchError::TooLarge { limit });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_transport)? {
            if body.len().saturating_add(chunk.len()) > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::trace!(url, bytes = body.len(), "feed body downloaded");
        Ok(body)
    }
}

fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.into())
    }
}

/// Parses an RSS 2.0 or Atom document into a [`RemoteFeedSnapshot`].
///
/// RSS: the freshness token is `lastBuildDate`, then `pubDate`. A channel
/// carrying neither gets a digest of its entry identifiers so new items still
/// move the token. Entry identifiers prefer `<guid>` and fall back to `<link>`.
///
/// Atom: the token is the feed `<updated>`, identifiers come from `<id>` and
/// locators from the alternate `<link href>`.
pub fn parse_channel(body: &[u8]) -> Result<RemoteFeedSnapshot, FetchError> {
    match rss::Channel::read_from(body) {
        Ok(channel) => Ok(rss_snapshot(&channel)),
        Err(rss::Error::InvalidStartTag) => atom_snapshot(body),
        Err(err) => Err(FetchError::Parse(anyhow!("invalid RSS document: {err}"))),
    }
}

fn rss_snapshot(channel: &rss::Channel) -> RemoteFeedSnapshot {
    let entries: Vec<RemoteEntry> = channel
        .items()
        .iter()
        .map(|item| {
            let locator = item.link().unwrap_or_default().to_string();
            let identifier = item
                .guid()
                .map(|guid| guid.value().to_string())
                .filter(|guid| !guid.is_empty())
                .unwrap_or_else(|| locator.clone());

            RemoteEntry {
                identifier,
                title: item.title().unwrap_or_default().to_string(),
                locator,
                updated_at: item.pub_date().unwrap_or_default().to_string(),
            }
        })
        .collect();

    let freshness_token = match channel.last_build_date().or_else(|| channel.pub_date()) {
        Some(date) => date.to_string(),
        None => identifier_digest(&entries),
    };

    RemoteFeedSnapshot {
        freshness_token,
        entries,
    }
}

fn atom_snapshot(body: &[u8]) -> Result<RemoteFeedSnapshot, FetchError> {
    let feed = atom_syndication::Feed::read_from(body).map_err(|err| {
        FetchError::Parse(anyhow!("document is neither RSS nor Atom: {err}"))
    })?;

    let entries = feed
        .entries()
        .iter()
        .map(|entry| {
            let locator = alternate_link(entry.links());
            let identifier = if entry.id().is_empty() {
                locator.clone()
            } else {
                entry.id().to_string()
            };

            RemoteEntry {
                identifier,
                title: entry.title().value.clone(),
                locator,
                updated_at: entry.updated().to_rfc3339(),
            }
        })
        .collect();

    Ok(RemoteFeedSnapshot {
        freshness_token: feed.updated().to_rfc3339(),
        entries,
    })
}

fn alternate_link(links: &[atom_syndication::Link]) -> String {
    links
        .iter()
        .find(|link| link.rel() == "alternate")
        .or_else(|| links.first())
        .map(|link| link.href().to_string())
        .unwrap_or_default()
}

/// Token for undated channels: empty when there are no entries.
fn identifier_digest(entries: &[RemoteEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.identifier.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
