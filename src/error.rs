//! Error types and result handling.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! [`CouchError`] classifies failures the way the server reports them:
//! transport-level I/O problems, undecodable bodies, the 404/409 document
//! outcomes, violated call preconditions, any other non-2xx status, and
//! changes-feed failures.
//!
//! Errors are fatal to the call that produced them; the client never retries.

use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Error, Debug)]
pub enum CouchError {
    /// Connection or I/O failure while executing a request. The in-flight
    /// exchange is torn down before this is returned.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was malformed or did not match the requested shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The server answered 404 for a document read, update, or delete.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The server answered 409; the caller holds a stale revision and must
    /// re-fetch before retrying.
    #[error("document conflict: {0}")]
    Conflict(String),

    /// The call arguments violated an identifier/revision invariant. Raised
    /// before any request is issued.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Any other non-success status, carrying the status reason followed by
    /// the full response body text.
    #[error("unexpected status {status}: {reason}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Status reason phrase plus the response body text.
        reason: String,
    },

    /// A read or parse failure on the continuous changes feed. The feed
    /// session is terminated.
    #[error("changes feed error: {0}")]
    Feed(String),
}

impl CouchError {
    /// True for the 404 document outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for the 409 document outcome.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True when the call was rejected before any request was issued.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

impl From<serde_json::Error> for CouchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, CouchError>;
