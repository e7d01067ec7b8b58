//! Unified error types for larder.
//!
//! Display strings carry a stable upper-case code so callers and logs can
//! classify failures without matching on the variant.

use tokio_rusqlite::rusqlite;

/// Unified error type for the caching client and its stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A chain of memoized permanent redirects revisits a URL.
    #[error("REDIRECT_LOOP: {0}")]
    RedirectLoop(String),

    /// A 304 arrived but no long-term entry exists to supply the body.
    ///
    /// The request must be reissued without validator headers.
    #[error("REVALIDATION_UNAVAILABLE: {0}")]
    RevalidationUnavailable(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored record could not be encoded or decoded.
    #[error("STORE_ERROR: {0}")]
    Store(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The transport failed to complete the exchange.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(String),

    /// The transport gave up following redirects.
    #[error("TOO_MANY_REDIRECTS: limit of {0} reached")]
    TooManyRedirects(usize),

    /// A batch slot was not filled before the wait bound elapsed.
    #[error("TIMEOUT: {0}")]
    Timeout(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Store(format!("record encoding failed: {err}"))
    }
}
