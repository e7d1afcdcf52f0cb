//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`CoreConfig`] (documents directory, download
//! transport, event buffer) into a running [`CacheManager`]. Desktop apps
//! typically enable the `desktop-shims` feature, which lets the configuration
//! default its transport and directories from `bridge-desktop`; mobile hosts
//! inject a transport backed by their platform download session.
//!
//! ```ignore
//! use core_service::{CoreConfig, CoreService};
//!
//! let config = CoreConfig::builder()
//!     .documents_dir("/path/to/Documents")
//!     .build()?;
//! let core = CoreService::bootstrap(config)?;
//!
//! let track = core_service::ResourceRef::parse("https://cdn.example.com/audio/01.mp3")?;
//! let source = core.cache().resolve_source(&track);
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use bridge_traits::{
    DownloadRequest, DownloadTransport, LoggerSink, TransferId, TransportEvent,
    TransportEventSender,
};
pub use core_cache::{
    CacheConfig, CacheError, CacheManager, CacheStats, CacheStatus, DownloadState,
    InvalidationToken, MediaSource, ResourceRef, StartOutcome,
};
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder};
pub use core_runtime::events::{CacheEvent, CoreEvent, EventBus, EventStream};
pub use core_runtime::logging::{LogFormat, LoggingConfig};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Primary façade exposed to host applications.
///
/// Cloning is cheap; clones share the cache manager and event bus.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    cache: CacheManager,
    events: EventBus,
    pump: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CoreService {
    /// Build the cache manager from `config` and start its event pump.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Runtime`] if the configuration fails validation
    /// - [`CoreError::Cache`] if the cache cannot be created or no runtime is
    ///   available for the event pump
    #[instrument(skip(config), fields(media_dir = %config.media_dir().display()))]
    pub fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate().map_err(CoreError::from_runtime)?;

        let events = EventBus::new(config.event_buffer_size);
        let cache_config = CacheConfig::new(&config.documents_dir)
            .with_directory_name(config.media_directory_name.clone())
            .with_lookup_logging(config.log_cache_lookups);

        let cache = CacheManager::new(cache_config, Arc::clone(&config.transport))?
            .with_event_bus(events.clone());
        let pump = cache.start()?;

        info!("Core service started");
        Ok(Self {
            config: Arc::new(config),
            cache,
            events,
            pump: Arc::new(Mutex::new(Some(pump))),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The cache manager driven by this service.
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Event bus carrying [`CacheEvent`]s.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to cache events, optionally for one cache key.
    pub fn subscribe(&self, key: Option<&str>) -> EventStream {
        let stream = EventStream::new(self.events.subscribe());
        match key {
            Some(key) => stream.for_key(key),
            None => stream,
        }
    }

    /// Logging configuration that forwards to the configured host sink.
    pub fn logging_config(&self) -> LoggingConfig {
        let logging = LoggingConfig::default();
        match &self.config.logger_sink {
            Some(sink) => logging.with_logger_sink(Arc::clone(sink)),
            None => logging,
        }
    }

    /// Stop the event pump and wait for it to exit.
    ///
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        self.cache.shutdown();
        let handle = self.pump.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Event pump ended abnormally");
            }
        }
        info!("Core service stopped");
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("cache", &self.cache)
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}
