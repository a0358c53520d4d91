//! Feed data model: per-feed descriptors, the identity set used for
//! deduplication, and the remote snapshot returned by a fetch.

pub mod descriptor;
pub mod identity;
pub mod snapshot;

pub use descriptor::{Batch, FeedDescriptor, UnprocessedEntry};
pub use identity::IdentitySet;
pub use snapshot::{RemoteEntry, RemoteFeedSnapshot};
