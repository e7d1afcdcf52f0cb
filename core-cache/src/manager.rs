//! # Cache Manager
//!
//! Owns the local store, the download registry and the invalidation token,
//! and turns transport events into cache state changes.
//!
//! ## Concurrency
//!
//! All mutable state lives behind one `parking_lot::Mutex`. Every
//! read-modify-write of registry, token and store (including the rename that
//! publishes a finished download) happens inside a single acquisition, so
//! a resource is never observed as both cached and downloading. The transport
//! call, the completion handler and event-bus emission always run after the
//! lock is released.
//!
//! A finished download is first staged into the store directory without the
//! lock (this may be a cross-filesystem copy); only the final same-directory
//! rename happens inside the critical section.
//!
//! Transports report on a channel; the event pump started by
//! [`CacheManager::start`] drains it in order and applies each event through
//! [`CacheManager::handle_event`] on the blocking thread pool.
//!
//! ```text
//!  start_caching ──> DownloadTransport ──events──> pump ──> handle_event
//!                                                             │
//!               snapshots <── state (registry, token) <───────┘
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bridge_traits::transport::{
    DownloadRequest, DownloadTransport, TransferId, TransportEvent, TransportEventReceiver,
    TransportEventSender,
};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::format::format_byte_count;
use crate::registry::{DownloadRegistry, DownloadState};
use crate::resource::ResourceRef;
use crate::source::MediaSource;
use crate::stats::{CacheStats, CacheStatus};
use crate::store::LocalStore;
use crate::token::{InvalidationToken, TokenCell};

/// Callback run once when the transport reports that all transfers finished.
pub type CompletionHandler = Box<dyn FnOnce() + Send + 'static>;

/// Result of [`CacheManager::start_caching`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A transfer was handed to the transport.
    Started(TransferId),
    /// The file is already in the local store.
    AlreadyCached,
    /// A transfer for this resource is already in flight.
    AlreadyDownloading,
}

struct CacheState {
    registry: DownloadRegistry,
    token: TokenCell,
    completion_handler: Option<CompletionHandler>,
}

struct Inner {
    config: CacheConfig,
    store: LocalStore,
    transport: Arc<dyn DownloadTransport>,
    event_bus: OnceLock<EventBus>,
    state: Mutex<CacheState>,
    next_transfer: AtomicU64,
    events: TransportEventSender,
    receiver: Mutex<Option<TransportEventReceiver>>,
    shutdown: CancellationToken,
}

/// Download-and-cache coordinator.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    /// Create a cache manager.
    ///
    /// The store directory is not touched until the first write.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use core_cache::{CacheConfig, CacheManager, ResourceRef};
    /// use std::sync::Arc;
    ///
    /// let manager = CacheManager::new(CacheConfig::new(documents_dir), transport)?;
    /// manager.start()?;
    ///
    /// let track = ResourceRef::parse("https://cdn.example.com/audio/01.mp3")?;
    /// manager.start_caching(&track)?;
    /// ```
    pub fn new(config: CacheConfig, transport: Arc<dyn DownloadTransport>) -> Result<Self> {
        config.validate().map_err(CacheError::InvalidConfig)?;

        let store = LocalStore::new(config.cache_dir());
        let (events, receiver) = TransportEventSender::channel();

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                event_bus: OnceLock::new(),
                state: Mutex::new(CacheState {
                    registry: DownloadRegistry::new(),
                    token: TokenCell::new(),
                    completion_handler: None,
                }),
                next_transfer: AtomicU64::new(1),
                events,
                receiver: Mutex::new(Some(receiver)),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Publish cache events on `event_bus`.
    ///
    /// Only the first bus attached is used.
    pub fn with_event_bus(self, event_bus: EventBus) -> Self {
        if self.inner.event_bus.set(event_bus).is_err() {
            warn!("Event bus already attached, ignoring");
        }
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Directory holding the cached files.
    pub fn cache_dir(&self) -> &Path {
        self.inner.store.root()
    }

    // ========================================================================
    // Snapshot reads
    // ========================================================================

    /// Path of the cached file for `resource`, if it has been downloaded.
    pub fn local_path(&self, resource: &ResourceRef) -> Option<PathBuf> {
        let path = self.inner.store.lookup(resource);
        if self.inner.config.log_cache_lookups {
            debug!(key = resource.key(), hit = path.is_some(), "Cache lookup");
        }
        path
    }

    pub fn is_downloaded(&self, resource: &ResourceRef) -> bool {
        self.local_path(resource).is_some()
    }

    pub fn is_downloading(&self, resource: &ResourceRef) -> bool {
        self.inner.state.lock().registry.contains(resource)
    }

    /// Download fraction in `[0, 1]`, `None` when not downloading.
    pub fn progress(&self, resource: &ResourceRef) -> Option<f64> {
        self.download_state(resource).map(|state| state.progress)
    }

    pub fn download_state(&self, resource: &ResourceRef) -> Option<DownloadState> {
        self.inner.state.lock().registry.state(resource)
    }

    /// Resources currently downloading, sorted by cache key.
    pub fn downloading(&self) -> Vec<ResourceRef> {
        self.inner.state.lock().registry.refs()
    }

    pub fn download_states(&self) -> HashMap<ResourceRef, DownloadState> {
        self.inner.state.lock().registry.snapshot()
    }

    /// Lifecycle position of `resource`.
    pub fn status(&self, resource: &ResourceRef) -> CacheStatus {
        let state = self.inner.state.lock();
        if let Some(download) = state.registry.state(resource) {
            return CacheStatus::Downloading(download);
        }
        match self.inner.store.lookup(resource) {
            Some(path) => CacheStatus::Cached(path),
            None => CacheStatus::NotCached,
        }
    }

    /// Formatted size of the cached file (e.g. `"4.2 MB"`).
    ///
    /// Returns `None` when the file is not cached or cannot be read; read
    /// errors are logged. Use [`file_size_bytes`](Self::file_size_bytes) to
    /// observe them.
    pub fn file_size(&self, resource: &ResourceRef) -> Option<String> {
        match self.file_size_bytes(resource) {
            Ok(size) => size.map(format_byte_count),
            Err(e) => {
                error!(key = resource.key(), error = %e, "Failed to read cached file size");
                None
            }
        }
    }

    pub fn file_size_bytes(&self, resource: &ResourceRef) -> Result<Option<u64>> {
        Ok(self.inner.store.file_len(resource)?)
    }

    /// Current invalidation token.
    pub fn token(&self) -> InvalidationToken {
        self.inner.state.lock().token.current()
    }

    /// Watch channel that yields every new invalidation token.
    pub fn subscribe(&self) -> watch::Receiver<InvalidationToken> {
        self.inner.state.lock().token.subscribe()
    }

    /// Summary of the store contents and in-flight downloads.
    pub fn stats(&self) -> Result<CacheStats> {
        let (cached_files, total_bytes) = tally_files(&self.inner.store.list()?)?;

        Ok(CacheStats {
            cached_files,
            total_bytes,
            downloading: self.inner.state.lock().registry.len(),
            calculated_at: chrono::Utc::now().timestamp(),
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Request that `resource` be cached.
    ///
    /// Idempotent: at most one transfer per resource is in flight, and cached
    /// resources are never fetched again. Returns as soon as the transport has
    /// accepted the request; later failures are reported through events, not
    /// through this call.
    ///
    /// # Errors
    ///
    /// [`CacheError::Transport`] if the transport refuses to start. The
    /// resource is left not downloading.
    #[instrument(skip(self, resource), fields(key = resource.key()))]
    pub fn start_caching(&self, resource: &ResourceRef) -> Result<StartOutcome> {
        let id = {
            let mut state = self.inner.state.lock();

            if self.inner.store.lookup(resource).is_some() {
                debug!("Already cached");
                return Ok(StartOutcome::AlreadyCached);
            }

            if state.registry.contains(resource) {
                debug!("Already downloading");
                return Ok(StartOutcome::AlreadyDownloading);
            }

            let id = TransferId(self.inner.next_transfer.fetch_add(1, Ordering::Relaxed));
            state.registry.begin(resource, id);
            id
        };

        info!(transfer = %id, url = %resource.url(), "Starting download");
        self.emit(CacheEvent::DownloadStarted {
            key: resource.key().to_string(),
            url: resource.url().to_string(),
            transfer_id: id,
        });

        let request = DownloadRequest::new(id, resource.url().clone());
        if let Err(e) = self
            .inner
            .transport
            .begin_download(request, self.inner.events.clone())
        {
            self.inner.state.lock().registry.finish(resource, id);
            error!(transfer = %id, error = %e, "Transport refused download");
            self.emit(CacheEvent::DownloadFailed {
                key: resource.key().to_string(),
                transfer_id: id,
                message: e.to_string(),
            });
            return Err(e.into());
        }

        Ok(StartOutcome::Started(id))
    }

    /// Delete the cached copy of `resource`.
    ///
    /// Returns `Ok(false)` without touching the token when nothing was cached.
    #[instrument(skip(self, resource), fields(key = resource.key()))]
    pub fn remove_cache(&self, resource: &ResourceRef) -> Result<bool> {
        let token = {
            let mut state = self.inner.state.lock();
            match self.inner.store.remove(resource) {
                Ok(true) => state.token.bump(),
                Ok(false) => {
                    debug!("Nothing cached to remove");
                    return Ok(false);
                }
                Err(e) => {
                    error!(error = %e, "Failed to remove cached file");
                    return Err(e.into());
                }
            }
        };

        info!(token = %token, "Removed cached file");
        self.emit(CacheEvent::CacheRemoved {
            key: resource.key().to_string(),
            token: token.to_string(),
        });
        Ok(true)
    }

    /// Register the callback run when the transport next drains.
    ///
    /// Replaces any handler that has not fired yet.
    pub fn set_completion_handler<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.state.lock().completion_handler = Some(Box::new(handler));
    }

    /// Pick where a player should read `resource` from.
    ///
    /// Cached resources play from disk. Anything else streams from its URL
    /// while a background download is requested; a refused request is logged
    /// and does not affect the returned source.
    pub fn resolve_source(&self, resource: &ResourceRef) -> MediaSource {
        if let Some(path) = self.local_path(resource) {
            return MediaSource::Local(path);
        }

        if let Err(e) = self.start_caching(resource) {
            warn!(key = resource.key(), error = %e, "Background caching not started");
        }
        MediaSource::Remote(resource.url().clone())
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    /// Apply one transport event.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Progress {
                id,
                url,
                bytes_written,
                bytes_expected,
            } => self.on_progress(id, &url, bytes_written, bytes_expected),
            TransportEvent::Completed { id, url, temp_path } => {
                self.on_completed(id, &url, &temp_path)
            }
            TransportEvent::Failed { id, url, error } => self.on_failed(id, &url, &error),
            TransportEvent::SessionDrained => self.on_session_drained(),
        }
    }

    fn on_progress(&self, id: TransferId, url: &Url, bytes_written: i64, bytes_expected: i64) {
        let Some(resource) = resource_for(url) else {
            return;
        };

        let updated = self.inner.state.lock().registry.apply_progress(
            &resource,
            id,
            bytes_written,
            bytes_expected,
        );

        match updated {
            Some(state) => {
                trace!(
                    key = resource.key(),
                    written = state.bytes_written,
                    expected = state.bytes_expected,
                    "Download progress"
                );
                self.emit(CacheEvent::DownloadProgress {
                    key: resource.key().to_string(),
                    transfer_id: id,
                    bytes_written: state.bytes_written,
                    bytes_expected: state.bytes_expected,
                });
            }
            None => trace!(key = resource.key(), transfer = %id, "Ignoring stale progress"),
        }
    }

    fn on_completed(&self, id: TransferId, url: &Url, temp_path: &Path) {
        let Some(resource) = resource_for(url) else {
            discard_temp_file(temp_path);
            return;
        };

        if self.inner.state.lock().registry.attempt(&resource) != Some(id) {
            warn!(key = resource.key(), transfer = %id, "Ignoring stale completion");
            discard_temp_file(temp_path);
            return;
        }

        // May copy across filesystems, so it runs before the lock is taken.
        let staged = match self.inner.store.stage(temp_path, &resource) {
            Ok(staged) => staged,
            Err(e) => {
                let cleared = self.inner.state.lock().registry.finish(&resource, id);
                discard_temp_file(temp_path);
                if cleared {
                    self.report_move_failure(&resource, id, &e);
                }
                return;
            }
        };

        let outcome = {
            let mut state = self.inner.state.lock();
            if state.registry.attempt(&resource) != Some(id) {
                None
            } else {
                let committed = self.inner.store.commit(&staged, &resource);
                state.registry.finish(&resource, id);
                Some(committed.map(|path| (path, state.token.bump())))
            }
        };

        match outcome {
            None => {
                warn!(key = resource.key(), transfer = %id, "Ignoring stale completion");
                discard_temp_file(&staged);
            }
            Some(Ok((path, token))) => {
                info!(key = resource.key(), path = %path.display(), "Download cached");
                self.emit(CacheEvent::DownloadCompleted {
                    key: resource.key().to_string(),
                    path: path.display().to_string(),
                    token: token.to_string(),
                });
            }
            Some(Err(e)) => {
                discard_temp_file(&staged);
                self.report_move_failure(&resource, id, &e);
            }
        }
    }

    fn report_move_failure(&self, resource: &ResourceRef, id: TransferId, err: &std::io::Error) {
        error!(key = resource.key(), error = %err, "Failed to move download into cache");
        self.emit(CacheEvent::DownloadFailed {
            key: resource.key().to_string(),
            transfer_id: id,
            message: err.to_string(),
        });
    }

    fn on_failed(&self, id: TransferId, url: &Url, message: &str) {
        let Some(resource) = resource_for(url) else {
            return;
        };

        if !self.inner.state.lock().registry.finish(&resource, id) {
            trace!(key = resource.key(), transfer = %id, "Ignoring stale failure");
            return;
        }

        warn!(key = resource.key(), transfer = %id, error = message, "Download failed");
        self.emit(CacheEvent::DownloadFailed {
            key: resource.key().to_string(),
            transfer_id: id,
            message: message.to_string(),
        });
    }

    fn on_session_drained(&self) {
        let handler = self.inner.state.lock().completion_handler.take();
        let handler_invoked = handler.is_some();

        if let Some(handler) = handler {
            debug!("Running completion handler");
            handler();
        }

        self.emit(CacheEvent::SessionDrained { handler_invoked });
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = self.inner.event_bus.get() {
            // No subscribers is fine.
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }

    // ========================================================================
    // Event pump
    // ========================================================================

    /// Spawn the task that applies transport events.
    ///
    /// Events sent before the pump starts are queued and applied once it runs.
    ///
    /// # Errors
    ///
    /// - [`CacheError::AlreadyStarted`] if the pump was started before
    /// - [`CacheError::RuntimeUnavailable`] outside a Tokio runtime
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let handle =
            Handle::try_current().map_err(|e| CacheError::RuntimeUnavailable(e.to_string()))?;

        let mut receiver = self
            .inner
            .receiver
            .lock()
            .take()
            .ok_or(CacheError::AlreadyStarted)?;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();

        info!("Starting transport event pump");
        Ok(handle.spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                // Completions touch the filesystem; keep them off the async workers.
                let manager = CacheManager { inner };
                let handled = tokio::task::spawn_blocking(move || manager.handle_event(event));
                if let Err(e) = handled.await {
                    error!(error = %e, "Transport event handler failed");
                }
            }
            debug!("Transport event pump stopped");
        }))
    }

    /// Stop the event pump. Queued events are dropped.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_dir", &self.inner.store.root())
            .field("downloading", &self.inner.state.lock().registry.len())
            .finish()
    }
}

fn resource_for(url: &Url) -> Option<ResourceRef> {
    match ResourceRef::new(url.clone()) {
        Ok(resource) => Some(resource),
        Err(e) => {
            warn!(url = %url, error = %e, "Transport event for unknown resource");
            None
        }
    }
}

/// Count and total size of `paths`, skipping files that no longer exist.
fn tally_files(paths: &[PathBuf]) -> std::io::Result<(usize, u64)> {
    let mut count = 0;
    let mut bytes = 0;
    for path in paths {
        match fs::metadata(path) {
            Ok(meta) => {
                count += 1;
                bytes += meta.len();
            }
            // Removed since the directory was listed.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok((count, bytes))
}

fn discard_temp_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to delete temporary download");
        }
    }
}
