use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted marker for a member of an [`IdentitySet`]. Serialises as `{}`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Present {}

/// Set of entry identifiers already surfaced for one feed.
///
/// Membership is permanent: nothing is ever removed, so the set only grows
/// across runs. It is owned by a single [`FeedDescriptor`](super::FeedDescriptor)
/// and touched by one worker at a time, hence no internal locking.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentitySet {
    members: BTreeMap<String, Present>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.members.contains_key(identifier)
    }

    /// Records `identifier`. Returns `true` when it was not present before.
    pub fn add(&mut self, identifier: impl Into<String>) -> bool {
        self.members.insert(identifier.into(), Present {}).is_none()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn is_superset(&self, other: &IdentitySet) -> bool {
        other.iter().all(|identifier| self.contains(identifier))
    }
}

impl<S: Into<String>> FromIterator<S> for IdentitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for identifier in iter {
            set.add(identifier);
        }
        set
    }
}
