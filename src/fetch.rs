//! Remote fetch capability consumed by the reconciliation engine: the
//! object-safe `FetchFeed` trait, its error taxonomy, and the HTTP/RSS
//! implementation used by the binary.

pub mod error;
pub mod http;

pub use error::FetchError;
pub use http::HttpFeedFetcher;

use crate::feed::RemoteFeedSnapshot;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Fetches one feed.
///
/// Implementations must return [`FetchError::Cancelled`] promptly when `cancel`
/// is already cancelled or fires while the call is in flight. Any other error
/// is treated as a hard failure of that feed.
pub trait FetchFeed: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteFeedSnapshot, FetchError>>;
}
