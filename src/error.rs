//! Error types shared by every layer of the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the transport, backends, lock registry and reconcilers.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured API root could not be used as a base URI.
    #[error("malformed API root {root:?}: {reason}")]
    MalformedRoot { root: String, reason: String },

    /// A client component could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),

    /// The token provider could not supply a bearer token.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Network-level failure (DNS, connect, TLS, timeout).
    #[error("{method} {url}: transport error: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response status was not accepted for the operation.
    #[error("{operation}: unexpected status {status} with response: {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("{operation}: decoding response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response parsed but is inconsistent with the request.
    #[error("{operation}: bad API response: {reason}")]
    BadResponse { operation: String, reason: String },

    /// The addressed object does not exist.
    #[error("{what} {id:?} was not found")]
    NotFound { what: String, id: String },

    /// A lookup expected exactly one match but found several.
    #[error("found {count} {what} matching filter {filter:?}")]
    AmbiguousMatch {
        what: String,
        filter: String,
        count: usize,
    },

    /// The sub-resource being created is already present.
    #[error("{what} {id:?} already exists; import it instead of creating it")]
    AlreadyExists { what: String, id: String },

    /// The object never became readable within the allotted time.
    #[error("{what} {id:?} did not become visible within {timeout:?}")]
    ReplicationTimeout {
        what: String,
        id: String,
        timeout: Duration,
    },

    /// A continuation link could not be followed.
    #[error("listing {what}: broken continuation on page {page}: {reason}")]
    Pagination {
        what: String,
        page: usize,
        reason: String,
    },

    /// The caller cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// A resource handle could not be decoded.
    #[error("invalid resource handle {handle:?}: {reason}")]
    InvalidHandle { handle: String, reason: String },

    /// User-supplied input was rejected; `attribute` names the offending field.
    #[error("{attribute}: {message}")]
    InvalidInput { attribute: String, message: String },
}

impl Error {
    /// Whether this error means the addressed object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Rewrites a rejected `404` into [`Error::NotFound`] for the given object.
    pub fn not_found_as(self, what: &str, id: &str) -> Self {
        match self {
            Error::UnexpectedStatus { status: 404, .. } => Error::NotFound {
                what: what.to_string(),
                id: id.to_string(),
            },
            other => other,
        }
    }

    pub(crate) fn invalid_input(attribute: &str, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}
