//! # Media Cache Core
//!
//! Turns named remote media resources into locally cached files.
//!
//! ## Overview
//!
//! - [`ResourceRef`] identifies a remote file by the last segment of its URL
//! - [`LocalStore`] is the flat directory of cached files
//! - [`DownloadRegistry`] tracks in-flight downloads and their progress
//! - [`CacheManager`] ties them together, drives a host
//!   [`DownloadTransport`](bridge_traits::DownloadTransport) and publishes an
//!   [`InvalidationToken`] whenever cache contents change
//!
//! ## Lifecycle per resource
//!
//! ```text
//! NotCached ──start_caching──> Downloading ──completed──> Cached
//!     ^                             │                        │
//!     └───────── failed ────────────┘                        │
//!     └──────────────────────── remove_cache ────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod manager;
pub mod registry;
pub mod resource;
pub mod source;
pub mod stats;
pub mod store;
pub mod token;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use format::format_byte_count;
pub use manager::{CacheManager, CompletionHandler, StartOutcome};
pub use registry::{DownloadRegistry, DownloadState};
pub use resource::ResourceRef;
pub use source::MediaSource;
pub use stats::{CacheStats, CacheStatus};
pub use store::LocalStore;
pub use token::InvalidationToken;
