//! # Core Configuration Module
//!
//! Builder-based configuration for the media cache core.
//!
//! ## Overview
//!
//! [`CoreConfig`] holds the host bridges and settings the core needs. The
//! builder validates everything up front so a misconfigured host fails at
//! startup with an actionable message instead of on the first download.
//!
//! ## Required Dependencies
//!
//! - `documents_dir` - directory the `Media` cache folder lives under
//! - `DownloadTransport` - performs the actual transfers
//!
//! When the `desktop-shims` feature is enabled both are defaulted from
//! `bridge-desktop` (platform documents folder and `ReqwestTransport`).
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .documents_dir("/path/to/Documents")
//!     .transport(Arc::new(MyTransport))
//!     .build()
//!     .expect("Failed to build config");
//!
//! assert_eq!(config.media_dir(), std::path::Path::new("/path/to/Documents/Media"));
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{DownloadTransport, LoggerSink};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the cache folder created under the documents directory.
pub const DEFAULT_MEDIA_DIRECTORY: &str = "Media";

/// Upper bound for the event bus buffer.
const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Core configuration for the media cache.
#[derive(Clone)]
pub struct CoreConfig {
    /// Durable directory the media cache folder is created in
    pub documents_dir: PathBuf,

    /// Name of the cache folder inside `documents_dir`
    pub media_directory_name: String,

    /// Host transport used to fetch remote resources
    pub transport: Arc<dyn DownloadTransport>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// Log every cache lookup hit/miss at debug level
    pub log_cache_lookups: bool,

    /// Optional host logger the tracing output is mirrored into
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("documents_dir", &self.documents_dir)
            .field("media_directory_name", &self.media_directory_name)
            .field("transport", &"DownloadTransport { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("log_cache_lookups", &self.log_cache_lookups)
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Full path of the cache folder.
    pub fn media_dir(&self) -> PathBuf {
        self.documents_dir.join(&self.media_directory_name)
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - the documents directory is not empty
    /// - the media folder name is a single plain path component
    /// - the event buffer size is within `1..=65536`
    pub fn validate(&self) -> Result<()> {
        if self.documents_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Documents directory cannot be empty".to_string(),
            ));
        }

        validate_directory_name(&self.media_directory_name)?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }
}

fn validate_directory_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Config(
            "Media directory name cannot be empty".to_string(),
        ));
    }

    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Config(format!(
            "Media directory name must be a single folder name, got '{}'",
            name
        )));
    }

    Ok(())
}

#[cfg(not(feature = "desktop-shims"))]
fn transport_missing_error() -> Error {
    Error::capability_missing(
        "DownloadTransport",
        "DownloadTransport implementation is required to fetch media. \
         Desktop: enable the 'desktop-shims' feature to use the default ReqwestTransport. \
         Mobile: inject a transport backed by the platform's background download session.",
    )
}

#[cfg(feature = "desktop-shims")]
fn provide_default_documents_dir() -> Result<PathBuf> {
    Ok(bridge_desktop::DesktopDirectories::new()
        .documents_dir()
        .to_path_buf())
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_documents_dir() -> Result<PathBuf> {
    Err(Error::Config(
        "Documents directory is required. Use .documents_dir() to set it.".to_string(),
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_transport() -> Result<Arc<dyn DownloadTransport>> {
    use bridge_desktop::{DesktopDirectories, ReqwestTransport};

    let staging_dir = DesktopDirectories::new().staging_dir();
    let transport = ReqwestTransport::new(staging_dir).map_err(|e| {
        Error::capability_missing(
            "DownloadTransport",
            format!(
                "Default ReqwestTransport could not be created ({}). \
                 Build the configuration inside a Tokio runtime or inject a transport.",
                e
            ),
        )
    })?;

    let transport: Arc<dyn DownloadTransport> = Arc::new(transport);
    Ok(transport)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_transport() -> Result<Arc<dyn DownloadTransport>> {
    Err(transport_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    documents_dir: Option<PathBuf>,
    media_directory_name: Option<String>,
    transport: Option<Arc<dyn DownloadTransport>>,
    event_buffer_size: Option<usize>,
    log_cache_lookups: Option<bool>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
}

impl CoreConfigBuilder {
    /// Sets the directory the cache folder is created in.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().documents_dir("/path/to/Documents");
    /// ```
    pub fn documents_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.documents_dir = Some(path.into());
        self
    }

    /// Overrides the cache folder name (default `Media`).
    pub fn media_directory_name(mut self, name: impl Into<String>) -> Self {
        self.media_directory_name = Some(name.into());
        self
    }

    /// Sets the download transport.
    ///
    /// If not provided, the desktop default (reqwest-based) is used when the
    /// `desktop-shims` feature is enabled.
    pub fn transport(mut self, transport: Arc<dyn DownloadTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn log_cache_lookups(mut self, enabled: bool) -> Self {
        self.log_cache_lookups = Some(enabled);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if a required path is missing or a value is invalid
    /// - [`Error::CapabilityMissing`] if no transport was injected and no
    ///   platform default is available
    pub fn build(self) -> Result<CoreConfig> {
        let documents_dir = match self.documents_dir {
            Some(dir) => dir,
            None => provide_default_documents_dir()?,
        };

        let media_directory_name = self
            .media_directory_name
            .unwrap_or_else(|| DEFAULT_MEDIA_DIRECTORY.to_string());

        // Checked before the default transport is constructed.
        validate_directory_name(&media_directory_name)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => provide_default_transport()?,
        };

        let config = CoreConfig {
            documents_dir,
            media_directory_name,
            transport,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            log_cache_lookups: self.log_cache_lookups.unwrap_or(true),
            logger_sink: self.logger_sink,
        };

        config.validate()?;

        Ok(config)
    }
}

impl std::fmt::Debug for CoreConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfigBuilder")
            .field("documents_dir", &self.documents_dir)
            .field("media_directory_name", &self.media_directory_name)
            .field("has_transport", &self.transport.is_some())
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}
