//! Durable session storage.
//!
//! [`DurableStorage`] moves a session's files between the local workspace
//! and durable storage; [`MetadataStore`] holds the session record. The
//! shipped implementation, [`LocalStorage`], backs both with a directory
//! tree on a persistent volume.

pub mod local;

use std::path::Path;

use futures_util::future::BoxFuture;

use crate::models::session::SessionMetadata;
use crate::Result;

pub use local::LocalStorage;

/// Durable copy of each session's workspace files.
pub trait DurableStorage: Send + Sync {
    /// Restore the stored files for `session_id` into `session_root`.
    ///
    /// Returns `false` when nothing is stored for the session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the stored files cannot be copied.
    fn download<'a>(
        &'a self,
        session_id: &'a str,
        session_root: &'a Path,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Replace the stored files for `session_id` with `session_root`'s contents.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the copy fails.
    fn upload<'a>(&'a self, session_id: &'a str, session_root: &'a Path)
        -> BoxFuture<'a, Result<()>>;

    /// List stored session ids.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the store cannot be enumerated.
    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Delete everything stored for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if nothing is stored for the id,
    /// or `AppError::Storage` if removal fails.
    fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Whole-record persistence of [`SessionMetadata`].
pub trait MetadataStore: Send + Sync {
    /// Load the record for `session_id`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the record exists but cannot be read.
    fn load<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionMetadata>>>;

    /// Overwrite the record for `metadata.session_id`; last write wins.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the record cannot be written.
    fn save<'a>(&'a self, metadata: &'a SessionMetadata) -> BoxFuture<'a, Result<()>>;
}
