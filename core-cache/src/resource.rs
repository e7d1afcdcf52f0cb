//! Remote resource identity
//!
//! A [`ResourceRef`] names one remote media file. Its identity is the final
//! non-empty path segment of the URL (the *cache key*), which is also the file
//! name used in the local store. Two URLs ending in the same segment, for
//! example `https://a.example/v1/x.mp3` and `https://b.example/v2/x.mp3`,
//! are the same resource as far as the cache is concerned.
//!
//! Keys are never percent-decoded: `https://cdn.example.com/My%20Song.mp3`
//! is stored on disk as `My%20Song.mp3`, not `My Song.mp3`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use url::Url;

use crate::error::{CacheError, Result};

/// Identifier for a remote artifact, keyed by its last path segment.
///
/// The key keeps the URL's percent-encoding, so it is also the exact on-disk
/// file name.
#[derive(Debug, Clone)]
pub struct ResourceRef {
    url: Url,
    key: String,
}

impl ResourceRef {
    /// Wrap a URL, rejecting URLs that have no usable final path segment.
    pub fn new(url: Url) -> Result<Self> {
        let key = cache_key(&url)
            .ok_or_else(|| CacheError::InvalidResource(format!("no file name in '{}'", url)))?;
        Ok(Self { url, key })
    }

    /// Parse and wrap a URL string.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| CacheError::InvalidResource(format!("'{}': {}", input, e)))?;
        Self::new(url)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// File name of the cached copy (still percent-encoded as in the URL).
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_url(self) -> Url {
        self.url
    }
}

fn cache_key(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .filter(|segment| *segment != "." && *segment != "..")
        .map(str::to_string)
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ResourceRef {}

impl Hash for ResourceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for ResourceRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl FromStr for ResourceRef {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<Url> for ResourceRef {
    type Error = CacheError;

    fn try_from(url: Url) -> Result<Self> {
        Self::new(url)
    }
}
