//! Error types for the local store and the remote backend
//!
//! Two boundaries, two taxonomies:
//! - `StoreError`: local persistence failures, including malformed JSON at
//!   the parse boundary (surfaced explicitly, never applied partially).
//! - `RemoteError`: transport and decoding failures talking to the backend.
//!   Transient errors are expected during normal operation and drive the
//!   sync state to offline rather than crashing anything.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur reading or writing the local snapshot
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create the data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read a file
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write a file
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWrite {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Persisted snapshot cannot be parsed
    #[error("Snapshot at '{path}' is not valid JSON: {source}")]
    MalformedSnapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An imported document cannot be parsed; local state is left untouched
    #[error("Import document is not valid JSON: {source}")]
    MalformedImport {
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize the snapshot or a record
    #[error("Failed to encode snapshot data: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for local store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur talking to the remote backend
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Network or service failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing or expired session token
    #[error("Not authorized: missing or expired session token")]
    Unauthorized,

    /// Response payload could not be decoded
    #[error("Failed to decode remote payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Change-notification channel failure
    #[error("Change channel error: {0}")]
    Channel(String),
}

impl RemoteError {
    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::Channel(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        RemoteError::Transport(error.to_string())
    }
}
