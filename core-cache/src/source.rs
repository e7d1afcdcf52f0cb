//! Playback source resolution

use std::path::{Path, PathBuf};

use url::Url;

/// Where a player should read a resource from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Fully cached file in the local store.
    Local(PathBuf),
    /// Not cached yet; stream from the original URL.
    Remote(Url),
}

impl MediaSource {
    pub fn is_local(&self) -> bool {
        matches!(self, MediaSource::Local(_))
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            MediaSource::Local(path) => Some(path),
            MediaSource::Remote(_) => None,
        }
    }

    pub fn remote_url(&self) -> Option<&Url> {
        match self {
            MediaSource::Remote(url) => Some(url),
            MediaSource::Local(_) => None,
        }
    }
}
