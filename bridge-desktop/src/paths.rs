//! Desktop directory resolution

use std::path::{Path, PathBuf};
use tracing::debug;

/// Folder created under the platform directories for this library.
pub const APP_DIR_NAME: &str = "media-cache-core";

/// Sub-directory of the cache dir where in-flight downloads are staged.
const STAGING_DIR_NAME: &str = "downloads";

/// Platform directories used by the desktop bridges.
///
/// - documents: durable storage the media cache lives under
/// - cache: scratch space for partially downloaded bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopDirectories {
    documents_dir: PathBuf,
    cache_dir: PathBuf,
}

impl DesktopDirectories {
    /// Resolve the platform defaults.
    pub fn new() -> Self {
        let documents_dir = dirs::document_dir()
            .or_else(dirs::data_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);

        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR_NAME);

        debug!(documents = ?documents_dir, cache = ?cache_dir, "Resolved desktop directories");
        Self {
            documents_dir,
            cache_dir,
        }
    }

    /// Use explicit directories (tests, portable installs).
    pub fn with_directories(documents_dir: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            documents_dir,
            cache_dir,
        }
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory where the transport writes bodies before the core moves them.
    pub fn staging_dir(&self) -> PathBuf {
        self.cache_dir.join(STAGING_DIR_NAME)
    }
}

impl Default for DesktopDirectories {
    fn default() -> Self {
        Self::new()
    }
}
