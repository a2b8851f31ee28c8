//! Typed error surface for the client core.
//!
//! Everything the crate can fail with is enumerated here. Transient
//! conditions (transport failures, the server's "try again" code) are retried
//! inside the request layer and only surface once retries are exhausted;
//! everything else propagates to the caller unchanged.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client core.
#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was missing or empty.
    #[error("required argument missing: {0}")]
    BadArgs(&'static str),

    /// The server rejected the credentials or the session.
    #[error("server rejected credentials or session")]
    BadAuth,

    /// A server response could not be parsed or had an unexpected shape.
    #[error("malformed server response: {0}")]
    BadResp(String),

    /// A path component did not resolve to a child node.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server kept answering "try again" until retries ran out.
    #[error("server busy after {0} attempts")]
    Eagain(u32),

    /// The folded content authenticator did not match the expected value.
    #[error("content MAC mismatch")]
    MacMismatch,

    /// A worker count in the configuration exceeds the allowed maximum.
    #[error("worker count {0} exceeds the limit of {1}")]
    WorkerLimitExceeded(usize, usize),

    /// An application-level error code the core does not map specially.
    #[error("api error code {0}")]
    Api(i64),

    /// HTTP transport failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for conditions the request layer is allowed to retry.
    ///
    /// `Io` counts because the transport seam reports socket-level failures
    /// through it; the request layer performs no other I/O.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Io(_) | Error::Eagain(_))
    }
}
