//! Client error types.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while talking to the remote administration server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The endpoint could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A single call did not finish within the configured timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The requested cluster is not known to the server.
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// The connection has already been closed.
    #[error("connection closed")]
    Closed,

    /// A snapshot file could not be read.
    #[error("failed to read snapshot {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file did not contain valid data.
    #[error("malformed snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Convenience result type.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
