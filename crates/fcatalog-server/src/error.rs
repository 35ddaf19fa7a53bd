//! Server-level error type.

use thiserror::Error;

/// Errors from binding or running a [`crate::Server`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The address that failed to bind.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to prepare the catalog base directory.
    #[error("failed to prepare db_base_path {path}: {source}")]
    BasePath {
        /// The configured base path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred while accepting or serving a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
