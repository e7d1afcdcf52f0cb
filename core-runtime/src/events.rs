//! # Event Bus System
//!
//! Broadcasts typed [`CoreEvent`]s from core modules to any number of
//! observers using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps one enum per domain; today that is
//!   [`CacheEvent`] for the download-and-cache subsystem
//! - **EventBus**: cloneable handle around the broadcast sender
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐    subscribe    ┌────────────────┐
//! │ CacheManager ├──────────────>│ EventBus  ├────────────────>│ download list  │
//! └──────────────┘               │ (broadcast│                 └────────────────┘
//!                                │  channel) ├────────────────>┌────────────────┐
//!                                └───────────┘                 │ player / cells │
//!                                                              └────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Cache(CacheEvent::CacheRemoved {
//!         key: "01.mp3".to_string(),
//!         token: "7d3c".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Cached file removed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving. Observers should re-read snapshots from the cache manager.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! Emitting with no subscribers returns `Err(SendError)`, which publishers are
//! expected to ignore.

use bridge_traits::transport::TransferId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Progress events arrive once per received chunk, so bursts are common.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Download and cache events
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Cache(CacheEvent::DownloadFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::DownloadCompleted { .. })
            | CoreEvent::Cache(CacheEvent::CacheRemoved { .. })
            | CoreEvent::Cache(CacheEvent::DownloadStarted { .. }) => EventSeverity::Info,
            CoreEvent::Cache(_) => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events describing changes to the local media cache.
///
/// `key` is the cache key of the resource (the final path segment of its URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A transfer was handed to the transport.
    DownloadStarted {
        key: String,
        url: String,
        transfer_id: TransferId,
    },
    /// Bytes were persisted for an in-flight transfer.
    DownloadProgress {
        key: String,
        transfer_id: TransferId,
        bytes_written: i64,
        /// `-1` when the size is unknown.
        bytes_expected: i64,
    },
    /// The body was moved into the local store.
    DownloadCompleted {
        key: String,
        path: String,
        /// Invalidation token published with this change.
        token: String,
    },
    /// The transfer failed or its body could not be stored.
    DownloadFailed {
        key: String,
        transfer_id: TransferId,
        message: String,
    },
    /// A cached file was deleted.
    CacheRemoved { key: String, token: String },
    /// The transport finished every queued transfer.
    SessionDrained {
        /// Whether a registered completion handler was run.
        handler_invoked: bool,
    },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::DownloadStarted { .. } => "Download started",
            CacheEvent::DownloadProgress { .. } => "Download progress",
            CacheEvent::DownloadCompleted { .. } => "Download cached",
            CacheEvent::DownloadFailed { .. } => "Download failed",
            CacheEvent::CacheRemoved { .. } => "Cached file removed",
            CacheEvent::SessionDrained { .. } => "All downloads finished",
        }
    }

    /// Cache key the event refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::DownloadStarted { key, .. }
            | CacheEvent::DownloadProgress { key, .. }
            | CacheEvent::DownloadCompleted { key, .. }
            | CacheEvent::DownloadFailed { key, .. }
            | CacheEvent::CacheRemoved { key, .. } => Some(key),
            CacheEvent::SessionDrained { .. } => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for core events.
///
/// Cloning the bus clones the sender; all clones publish to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (see `tokio::sync::broadcast::channel`).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new receiver. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CacheEvent, CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(16);
/// let failures = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Cache(CacheEvent::DownloadFailed { .. })));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    ///
    /// Filters compose: an event must pass every predicate added.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Box::new(move |event| existing(event) && predicate(event)),
            None => Box::new(predicate),
        });
        self
    }

    /// Restrict the stream to events about one cache key.
    pub fn for_key(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.filter(move |event| match event {
            CoreEvent::Cache(e) => e.key() == Some(key.as_str()),
        })
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn removed(key: &str) -> CoreEvent {
        CoreEvent::Cache(CacheEvent::CacheRemoved {
            key: key.to_string(),
            token: "token".to_string(),
        })
    }

    fn failed(key: &str) -> CoreEvent {
        CoreEvent::Cache(CacheEvent::DownloadFailed {
            key: key.to_string(),
            transfer_id: TransferId(3),
            message: "HTTP error: 404".to_string(),
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_an_error() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(removed("a.mp3")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.emit(removed("a.mp3")).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), removed("a.mp3"));
        assert_eq!(sub2.recv().await.unwrap(), removed("a.mp3"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).filter(|event| {
            matches!(event, CoreEvent::Cache(CacheEvent::DownloadFailed { .. }))
        });

        bus.emit(removed("a.mp3")).unwrap();
        bus.emit(failed("b.mp3")).unwrap();

        assert_eq!(stream.recv().await.unwrap(), failed("b.mp3"));
    }

    #[tokio::test]
    async fn test_event_stream_for_key() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).for_key("b.mp3");

        bus.emit(removed("a.mp3")).unwrap();
        bus.emit(CoreEvent::Cache(CacheEvent::SessionDrained {
            handler_invoked: false,
        }))
        .unwrap();
        bus.emit(removed("b.mp3")).unwrap();

        assert_eq!(stream.try_recv().unwrap().unwrap(), removed("b.mp3"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_filters_compose() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .for_key("b.mp3")
            .filter(|event| matches!(event, CoreEvent::Cache(CacheEvent::DownloadFailed { .. })));

        bus.emit(failed("a.mp3")).unwrap();
        bus.emit(removed("b.mp3")).unwrap();
        bus.emit(failed("b.mp3")).unwrap();

        assert_eq!(stream.try_recv().unwrap().unwrap(), failed("b.mp3"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(removed(&format!("{}.mp3", i))).unwrap();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        assert!(sub.recv().await.is_ok());
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(failed("a.mp3").severity(), EventSeverity::Warning);
        assert_eq!(removed("a.mp3").severity(), EventSeverity::Info);
        let progress = CoreEvent::Cache(CacheEvent::DownloadProgress {
            key: "a.mp3".to_string(),
            transfer_id: TransferId(1),
            bytes_written: 50,
            bytes_expected: 200,
        });
        assert_eq!(progress.severity(), EventSeverity::Debug);
        assert!(EventSeverity::Warning > EventSeverity::Info);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(removed("a.mp3")).unwrap();
        assert_eq!(json["type"], "Cache");
        assert_eq!(json["payload"]["event"], "CacheRemoved");
        assert_eq!(json["payload"]["key"], "a.mp3");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, removed("a.mp3"));
    }

    #[test]
    fn test_event_key() {
        let CoreEvent::Cache(event) = failed("b.mp3");
        assert_eq!(event.key(), Some("b.mp3"));
        assert_eq!(
            CacheEvent::SessionDrained {
                handler_invoked: true
            }
            .key(),
            None
        );
    }
}
