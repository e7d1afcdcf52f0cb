//! Download Transport Contract
//!
//! The cache core never talks to the network itself. It hands a
//! [`DownloadRequest`] to a host-provided [`DownloadTransport`] and then
//! observes the transfer exclusively through [`TransportEvent`]s delivered on
//! a [`TransportEventSender`].
//!
//! ## Event contract
//!
//! | Event | Payload | Meaning |
//! |---|---|---|
//! | `Progress` | id, url, bytes written, bytes expected | bytes persisted so far; expected is `-1` when unknown |
//! | `Completed` | id, url, temp path | body fully written to a temporary file the core now owns |
//! | `Failed` | id, url, error | transfer abandoned, no temporary file is left behind |
//! | `SessionDrained` | none | every transfer the transport had queued has finished |
//!
//! For a single [`TransferId`], `Completed` or `Failed` is the last event sent.
//! Transports may call the sender from any thread or task.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::error::{BridgeError, Result};

/// Identifier of one download attempt.
///
/// The core allocates a fresh id every time it asks the transport to start a
/// transfer, so events from an abandoned attempt can be told apart from those
/// of a later attempt for the same resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transfer-{}", self.0)
    }
}

/// A request to fetch one remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub id: TransferId,
    pub url: Url,
}

impl DownloadRequest {
    pub fn new(id: TransferId, url: Url) -> Self {
        Self { id, url }
    }
}

/// Events emitted by a transport while it works on download requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Incremental progress for a transfer.
    Progress {
        id: TransferId,
        url: Url,
        /// Cumulative bytes written to the temporary file.
        bytes_written: i64,
        /// Total expected size, `-1` (or `0`) when the server did not say.
        bytes_expected: i64,
    },
    /// Transfer finished; the body lives at `temp_path` until the core moves it.
    Completed {
        id: TransferId,
        url: Url,
        temp_path: PathBuf,
    },
    /// Transfer failed (network error, HTTP error status, local I/O error).
    Failed {
        id: TransferId,
        url: Url,
        error: String,
    },
    /// All transfers queued on the transport have finished.
    SessionDrained,
}

impl TransportEvent {
    /// Transfer this event belongs to, `None` for session-level events.
    pub fn transfer_id(&self) -> Option<TransferId> {
        match self {
            TransportEvent::Progress { id, .. }
            | TransportEvent::Completed { id, .. }
            | TransportEvent::Failed { id, .. } => Some(*id),
            TransportEvent::SessionDrained => None,
        }
    }

    /// Whether this is the last event of its transfer.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportEvent::Completed { .. } | TransportEvent::Failed { .. }
        )
    }
}

/// Sending half handed to transports alongside every request.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    inner: mpsc::UnboundedSender<TransportEvent>,
}

/// Receiving half owned by the cache core's event pump.
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

impl TransportEventSender {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (Self, TransportEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { inner: tx }, rx)
    }

    /// Deliver an event to the core.
    ///
    /// Fails only when the core has shut down its event pump.
    pub fn send(&self, event: TransportEvent) -> Result<()> {
        self.inner
            .send(event)
            .map_err(|_| BridgeError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Host download transport.
///
/// Implementations must return from [`begin_download`](Self::begin_download)
/// without waiting for the transfer; all outcomes are reported as events.
/// An `Err` return means the transfer was never started and no events will be
/// sent for that request.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transport::{DownloadRequest, DownloadTransport, TransportEventSender};
///
/// struct NullTransport;
///
/// impl DownloadTransport for NullTransport {
///     fn begin_download(&self, request: DownloadRequest, events: TransportEventSender) -> Result<()> {
///         events.send(TransportEvent::Failed {
///             id: request.id,
///             url: request.url,
///             error: "offline".into(),
///         })
///     }
/// }
/// ```
pub trait DownloadTransport: Send + Sync {
    /// Start fetching `request.url`, reporting through `events`.
    fn begin_download(&self, request: DownloadRequest, events: TransportEventSender)
        -> Result<()>;

    /// Number of transfers currently in flight, when the transport tracks it.
    fn in_flight(&self) -> Option<usize> {
        None
    }
}
