//! # Local Store
//!
//! A single flat directory holding one file per cached resource, named by the
//! resource's cache key. Presence of the file is the only record that a
//! resource is cached; there are no sidecar metadata files.
//!
//! The store calls `std::fs` directly instead of going through an async host
//! filesystem bridge: cache manager reads such as `local_path` and `status`
//! are synchronous and some run under its state lock, where an async call
//! cannot be awaited. The directory is created lazily and re-checked before
//! every write.
//!
//! A finished download enters the store in two steps. [`LocalStore::stage`]
//! brings the temporary file into the store directory under a hidden
//! `.<key>.<uuid>.incoming` name; this is the step that may copy across
//! filesystems and is done without holding any cache lock.
//! [`LocalStore::commit`] then renames it over the destination, which is a
//! same-directory rename and never copies.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::resource::ResourceRef;

const INCOMING_SUFFIX: &str = ".incoming";

/// On-disk directory of cached files.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination path for `resource`, whether or not it exists.
    pub fn path_for(&self, resource: &ResourceRef) -> PathBuf {
        self.root.join(resource.key())
    }

    /// Create the store directory if it does not exist yet.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Path of the cached file, if present.
    pub fn lookup(&self, resource: &ResourceRef) -> Option<PathBuf> {
        let path = self.path_for(resource);
        path.is_file().then_some(path)
    }

    /// Size of the cached file in bytes, `None` if it is not cached.
    pub fn file_len(&self, resource: &ResourceRef) -> io::Result<Option<u64>> {
        match fs::metadata(self.path_for(resource)) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Move a finished download into the store, replacing any existing copy.
    pub fn move_in(&self, temp_path: &Path, resource: &ResourceRef) -> io::Result<PathBuf> {
        let staged = self.stage(temp_path, resource)?;
        self.commit(&staged, resource).map_err(|e| {
            discard(&staged);
            e
        })
    }

    /// Bring `temp_path` into the store directory under a hidden name.
    ///
    /// Falls back to copy + delete when the temporary file lives on another
    /// filesystem. The staged file is not visible to [`lookup`](Self::lookup)
    /// or [`list`](Self::list).
    pub fn stage(&self, temp_path: &Path, resource: &ResourceRef) -> io::Result<PathBuf> {
        self.ensure_dir()?;
        let staged = self.root.join(format!(
            ".{}.{}{}",
            resource.key(),
            Uuid::new_v4().simple(),
            INCOMING_SUFFIX
        ));

        if let Err(rename_err) = fs::rename(temp_path, &staged) {
            debug!(error = %rename_err, "Rename failed, copying instead");
            if let Err(e) = fs::copy(temp_path, &staged) {
                discard(&staged);
                return Err(e);
            }
            if let Err(e) = fs::remove_file(temp_path) {
                warn!(error = %e, "Failed to remove temporary file after copy");
            }
        }

        Ok(staged)
    }

    /// Rename a staged file over the destination of `resource`.
    pub fn commit(&self, staged: &Path, resource: &ResourceRef) -> io::Result<PathBuf> {
        self.ensure_dir()?;
        let destination = self.path_for(resource);

        match fs::remove_file(&destination) {
            Ok(()) => debug!(key = resource.key(), "Replacing existing cached file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        fs::rename(staged, &destination)?;
        Ok(destination)
    }

    /// Delete the cached file. Returns `false` when nothing was cached.
    pub fn remove(&self, resource: &ResourceRef) -> io::Result<bool> {
        match fs::remove_file(self.path_for(resource)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// All cached files, sorted by name. Empty if the directory is missing.
    pub fn list(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() && !is_incoming(&entry.path()) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_incoming(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with('.') && name.ends_with(INCOMING_SUFFIX))
}

/// Best-effort delete of a file the store created.
fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(error = %e, "Failed to delete staged file");
        }
    }
}
