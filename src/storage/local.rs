//! Filesystem-backed durable storage.
//!
//! Layout under the storage root:
//!
//! ```text
//! <storage_root>/<session_id>/session.json   metadata record
//! <storage_root>/<session_id>/files/         workspace snapshot
//! ```
//!
//! Uploads are staged next to the live snapshot and swapped in with a
//! rename; metadata is written through a temp file and persisted over the
//! previous record.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use super::{DurableStorage, MetadataStore};
use crate::models::session::SessionMetadata;
use crate::workspace::validate_session_id;
use crate::{AppError, Result};

const METADATA_FILE: &str = "session.json";
const FILES_DIR: &str = "files";

/// Durable storage rooted at a local (typically network-mounted) directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the directory cannot be created.
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).map_err(|err| {
            AppError::Storage(format!(
                "failed to create storage root {}: {err}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.root.join(session_id))
    }
}

impl DurableStorage for LocalStorage {
    fn download<'a>(
        &'a self,
        session_id: &'a str,
        session_root: &'a Path,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let source = self.session_dir(session_id)?.join(FILES_DIR);
            let target = session_root.to_path_buf();
            let span = info_span!("storage_download", session_id);

            let copied = tokio::task::spawn_blocking(move || -> Result<Option<u64>> {
                if !source.is_dir() {
                    return Ok(None);
                }
                copy_tree(&source, &target)
                    .map(Some)
                    .map_err(|err| AppError::Storage(format!("download failed: {err}")))
            })
            .await
            .map_err(|err| AppError::Storage(format!("download task panicked: {err}")))??;

            let _guard = span.enter();
            match copied {
                Some(files) => {
                    info!(session_id, files, "session files restored from storage");
                    Ok(true)
                }
                None => {
                    debug!(session_id, "no stored files for session");
                    Ok(false)
                }
            }
        })
    }

    fn upload<'a>(
        &'a self,
        session_id: &'a str,
        session_root: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let session_dir = self.session_dir(session_id)?;
            let source = session_root.to_path_buf();

            let files = tokio::task::spawn_blocking(move || -> Result<u64> {
                fs::create_dir_all(&session_dir)
                    .map_err(|err| AppError::Storage(format!("upload failed: {err}")))?;
                let staging = session_dir.join(format!(".{FILES_DIR}-{}", Uuid::new_v4()));
                let live = session_dir.join(FILES_DIR);

                let files = match copy_tree(&source, &staging) {
                    Ok(files) => files,
                    Err(err) => {
                        let _ = fs::remove_dir_all(&staging);
                        return Err(AppError::Storage(format!("upload failed: {err}")));
                    }
                };

                if live.exists() {
                    fs::remove_dir_all(&live).map_err(|err| {
                        AppError::Storage(format!("failed to replace stored files: {err}"))
                    })?;
                }
                fs::rename(&staging, &live).map_err(|err| {
                    AppError::Storage(format!("failed to swap in uploaded files: {err}"))
                })?;
                Ok(files)
            })
            .await
            .map_err(|err| AppError::Storage(format!("upload task panicked: {err}")))??;

            info!(session_id, files, "session files uploaded to storage");
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let root = self.root.clone();
            tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
                let entries = fs::read_dir(&root)
                    .map_err(|err| AppError::Storage(format!("cannot list storage: {err}")))?;
                let mut ids: Vec<String> = entries
                    .flatten()
                    .filter(|entry| entry.path().join(METADATA_FILE).is_file())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .collect();
                ids.sort();
                Ok(ids)
            })
            .await
            .map_err(|err| AppError::Storage(format!("list task panicked: {err}")))?
        })
    }

    fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dir = self.session_dir(session_id)?;
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    info!(session_id, "stored session deleted");
                    Ok(())
                }
                Err(err) if err.kind() == ErrorKind::NotFound => Err(AppError::SessionNotFound(
                    format!("no stored session '{session_id}'"),
                )),
                Err(err) => Err(AppError::Storage(format!(
                    "failed to delete session '{session_id}': {err}"
                ))),
            }
        })
    }
}

impl MetadataStore for LocalStorage {
    fn load<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionMetadata>>> {
        Box::pin(async move {
            let path = self.session_dir(session_id)?.join(METADATA_FILE);
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => {
                    return Err(AppError::Storage(format!(
                        "failed to read metadata for '{session_id}': {err}"
                    )))
                }
            };
            let metadata = serde_json::from_str(&raw).map_err(|err| {
                AppError::Storage(format!("corrupt metadata for '{session_id}': {err}"))
            })?;
            Ok(Some(metadata))
        })
    }

    fn save<'a>(&'a self, metadata: &'a SessionMetadata) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dir = self.session_dir(&metadata.session_id)?;
            let body = serde_json::to_vec_pretty(metadata)?;
            tokio::task::spawn_blocking(move || write_atomic(&dir, METADATA_FILE, &body))
                .await
                .map_err(|err| AppError::Storage(format!("metadata task panicked: {err}")))?
        })
    }
}

/// Write `body` to `dir/name` via a temp file in the same directory.
fn write_atomic(dir: &Path, name: &str, body: &[u8]) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|err| AppError::Storage(format!("failed to create {}: {err}", dir.display())))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|err| AppError::Storage(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(body)
        .map_err(|err| AppError::Storage(format!("failed to write temporary file: {err}")))?;

    let target = dir.join(name);
    tmp.persist(&target).map_err(|err| {
        AppError::Storage(format!("failed to persist {}: {err}", target.display()))
    })?;
    Ok(())
}

/// Recursively copy `src` into `dst`, returning the number of files copied.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copied += copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let link = fs::read_link(src)?;
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst)?;
    }
    std::os::unix::fs::symlink(link, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}
