//! # Host Bridge Traits
//!
//! Contracts between the media cache core and the host platform.
//!
//! ## Overview
//!
//! The core owns cache bookkeeping but delegates everything platform-shaped
//! to the host:
//!
//! - [`DownloadTransport`](transport::DownloadTransport) - starts transfers and
//!   reports them back as [`TransportEvent`](transport::TransportEvent)s
//! - [`LoggerSink`](logging::LoggerSink) - mirrors structured logs into the
//!   host logging pipeline
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Mobile   | injected by the host app |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep messages actionable.
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync`; the core shares them across tasks
//! behind `Arc`.

pub mod error;
pub mod logging;
pub mod transport;

pub use error::BridgeError;

pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use transport::{
    DownloadRequest, DownloadTransport, TransferId, TransportEvent, TransportEventReceiver,
    TransportEventSender,
};
