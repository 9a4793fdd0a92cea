//! Error types for corkboard-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using corkboard-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in corkboard-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote store error
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Comment not found
    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    /// Delete reported success but removed no rows. The row still exists
    /// remotely; the usual cause is a store with no delete permission
    /// configured for the comments table, though a concurrent delete a
    /// moment earlier looks identical.
    #[error(
        "Delete for comment {id} affected no rows; the row still exists remotely. \
         Check that the remote store grants delete permission on the comments table \
         (a concurrent delete can produce the same result)."
    )]
    DeleteBlocked {
        /// Comment id the delete targeted
        id: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
