/// One entry as reported by the remote feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteEntry {
    pub identifier: String,
    pub title: String,
    pub locator: String,
    pub updated_at: String,
}

impl RemoteEntry {
    pub fn new(identifier: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            locator: locator.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_updated_at(mut self, updated_at: impl Into<String>) -> Self {
        self.updated_at = updated_at.into();
        self
    }
}

/// Result of a successful fetch: an opaque freshness token plus the entries
/// in the order the remote returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFeedSnapshot {
    pub freshness_token: String,
    pub entries: Vec<RemoteEntry>,
}

impl RemoteFeedSnapshot {
    pub fn new(freshness_token: impl Into<String>, entries: Vec<RemoteEntry>) -> Self {
        Self {
            freshness_token: freshness_token.into(),
            entries,
        }
    }
}
