use super::identity::IdentitySet;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A remote item awaiting downstream processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnprocessedEntry {
    #[serde(rename = "url", default)]
    pub locator: String,
    #[serde(rename = "guid", default)]
    pub identifier: String,
}

impl UnprocessedEntry {
    pub fn new(identifier: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            locator: locator.into(),
        }
    }
}

/// Locally persisted state for one remote feed.
///
/// Every identifier in the unprocessed queue is also a member of the identity
/// set. The only way to grow the queue is [`FeedDescriptor::record_entry`],
/// which keeps the two in step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDescriptor {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    url: String,
    #[serde(rename = "updated", default, deserialize_with = "null_as_default")]
    cursor: String,
    #[serde(
        rename = "unprocessed_set",
        default,
        deserialize_with = "null_as_default"
    )]
    identities: IdentitySet,
    #[serde(
        rename = "unprocessed_items",
        default,
        deserialize_with = "null_as_default"
    )]
    unprocessed: Vec<UnprocessedEntry>,
}

impl FeedDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = cursor.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Marks `identifier` as already surfaced without queueing it, as if a
    /// downstream consumer had processed and removed it.
    pub fn with_known(mut self, identifier: impl Into<String>) -> Self {
        self.identities.add(identifier);
        self
    }

    pub fn with_entry(mut self, identifier: impl Into<String>, locator: impl Into<String>) -> Self {
        self.record_entry(identifier, locator);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Opaque freshness token recorded by the last successful fetch.
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn identities(&self) -> &IdentitySet {
        &self.identities
    }

    pub fn unprocessed(&self) -> &[UnprocessedEntry] {
        &self.unprocessed
    }

    pub(crate) fn advance_cursor(&mut self, token: impl Into<String>) {
        self.cursor = token.into();
    }

    /// Adds the entry to the identity set and, if it was unseen, appends it to
    /// the unprocessed queue. Returns `true` for a newly surfaced entry.
    pub fn record_entry(
        &mut self,
        identifier: impl Into<String>,
        locator: impl Into<String>,
    ) -> bool {
        let identifier = identifier.into();
        if self.identities.contains(&identifier) {
            return false;
        }
        self.identities.add(identifier.clone());
        self.unprocessed
            .push(UnprocessedEntry::new(identifier, locator));
        true
    }
}

/// Ordered collection of feed descriptors loaded for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBatch")]
pub struct Batch {
    pub version: String,
    pub items: Vec<FeedDescriptor>,
}

impl Batch {
    pub fn new(version: impl Into<String>, items: Vec<FeedDescriptor>) -> Self {
        Self {
            version: version.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Deserialize)]
struct RawBatch {
    #[serde(default, deserialize_with = "null_as_default")]
    version: String,
    #[serde(default)]
    items: Option<Vec<FeedDescriptor>>,
}

/// Rejection raised when a persisted batch carries no `items` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingItems;

impl fmt::Display for MissingItems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid batch document: `items` is missing or null")
    }
}

impl std::error::Error for MissingItems {}

impl TryFrom<RawBatch> for Batch {
    type Error = MissingItems;

    fn try_from(raw: RawBatch) -> Result<Self, Self::Error> {
        let items = raw.items.ok_or(MissingItems)?;
        Ok(Self {
            version: raw.version,
            items,
        })
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
