/// Result type used throughout the SDK.
///
/// This is a standard Rust `Result` where the error variant is the
/// SDK-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the SDK.
///
/// Errors are cloneable because a fetch result may be delivered to multiple
/// callers that joined the same in-flight request.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Initialization configuration failed validation. Fatal to that
    /// `initialize` call only.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation was called before a successful `initialize`. Recoverable
    /// by initializing the client first.
    #[error("client not initialized, call initialize() first")]
    NotInitialized,

    /// Network or server failure while fetching variants. Transient; the
    /// caller may retry the fetch.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// The fetch timeout elapsed with no response. Transient; the caller may
    /// retry the fetch.
    #[error("fetch timed out")]
    FetchTimeout,

    /// Durable storage failed. In-memory variants remain valid for the
    /// current process lifetime.
    #[error("variant storage failed: {0}")]
    Persistence(String),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Error::FetchTimeout
        } else {
            // Strip the URL as it may contain the deployment key.
            Error::FetchFailed(value.without_url().to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Persistence(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Persistence(value.to_string())
    }
}
