use anyhow::Error as AnyError;

/// Error surfaced by a [`FetchFeed`](super::FetchFeed) call.
///
/// `Cancelled` is a cooperative shutdown signal, every other variant is a
/// hard fetch failure for the feed being fetched.
#[derive(Debug)]
pub enum FetchError {
    Cancelled,
    Timeout,
    Status { status: u16 },
    TooLarge { limit: usize },
    Transport(AnyError),
    Parse(AnyError),
}

impl FetchError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Cancelled => write!(f, "feed fetch cancelled"),
            FetchError::Timeout => write!(f, "feed fetch timed out"),
            FetchError::Status { status } => {
                write!(f, "feed server responded with HTTP status {status}")
            }
            FetchError::TooLarge { limit } => {
                write!(f, "feed body exceeded the {limit} byte limit")
            }
            FetchError::Transport(err) => write!(f, "feed transport error: {err}"),
            FetchError::Parse(err) => write!(f, "feed parse error: {err}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport(err) | FetchError::Parse(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
