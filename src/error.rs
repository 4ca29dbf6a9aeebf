//! Error taxonomy for transport and client acquisition
//!
//! Cascades log individual failures and move on; only exhaustion is
//! surfaced through [`Error::NoUsableTransport`] or [`Error::NoUsableClient`].

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("the destination to copy the binary is not a directory: {0}")]
    DestinationNotDirectory(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("cannot authenticate to the Tor control port running on {0}")]
    AuthenticationFailed(String),

    #[error("Tor version {found} is older than the minimum supported {minimum}")]
    IncompatibleVersion { found: String, minimum: String },

    #[error("traffic is not routed through Tor via {0}")]
    ConnectivityFailed(String),

    #[error("Tor control error: {0}")]
    Protocol(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid meeting ID: {0}")]
    InvalidMeetingId(String),

    #[error("{0} used before it was initialized")]
    NotInitialized(&'static str),

    #[error("no usable transport found")]
    NoUsableTransport,

    #[error("no usable voice client found")]
    NoUsableClient,

    #[error("no usable voice server found")]
    NoUsableServer,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for `5xx`-style control replies meaning the target is unknown
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Error::Protocol(msg) if msg.starts_with("552"))
    }
}
