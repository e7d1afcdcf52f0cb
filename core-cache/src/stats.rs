//! Cache statistics and per-resource status

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::format::format_byte_count;
use crate::registry::DownloadState;

/// Point-in-time summary of the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of files in the local store
    pub cached_files: usize,

    /// Sum of cached file sizes in bytes
    pub total_bytes: u64,

    /// Number of downloads in flight
    pub downloading: usize,

    /// Unix timestamp when stats were calculated
    pub calculated_at: i64,
}

impl CacheStats {
    /// Returns average bytes per cached file.
    pub fn average_file_size(&self) -> u64 {
        if self.cached_files == 0 {
            0
        } else {
            self.total_bytes / self.cached_files as u64
        }
    }

    pub fn total_size_string(&self) -> String {
        format_byte_count(self.total_bytes)
    }
}

/// Where a single resource is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus {
    NotCached,
    Downloading(DownloadState),
    Cached(PathBuf),
}

impl CacheStatus {
    /// Returns true if the resource can be played from disk.
    pub fn is_available(&self) -> bool {
        matches!(self, CacheStatus::Cached(_))
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self, CacheStatus::Downloading(_))
    }

    /// Returns true if a download should be offered.
    pub fn needs_download(&self) -> bool {
        matches!(self, CacheStatus::NotCached)
    }
}
