//! Storage backend error type.

use thiserror::Error;

/// Errors from a [`super::Storage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The catalog was opened with a `num_perms` that disagrees with the
    /// value already persisted on disk.
    #[error("catalog was created with num_perms={on_disk}, but was opened with num_perms={requested}")]
    NumPermsMismatch {
        /// The value stored when the catalog was created.
        on_disk: u32,
        /// The value the caller asked to open with.
        requested: u32,
    },

    /// An operation was attempted on a store that already had `close` called
    /// on it.
    #[error("storage handle is closed")]
    Closed,

    /// The underlying backend (filesystem, database engine) failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Failed to (de)serialize a stored value.
    #[error("failed to (de)serialize a stored record: {0}")]
    Codec(String),
}
