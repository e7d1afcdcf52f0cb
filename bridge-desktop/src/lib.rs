//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `ReqwestTransport` streams downloads with `reqwest` into a staging
//!   directory and reports them as transport events
//! - `DesktopDirectories` resolves the documents and cache folders with `dirs`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopDirectories, ReqwestTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dirs = DesktopDirectories::new();
//!     let transport = Arc::new(ReqwestTransport::new(dirs.staging_dir()).unwrap());
//!
//!     // Hand both to the core configuration
//! }
//! ```

mod paths;
mod transport;

pub use paths::{DesktopDirectories, APP_DIR_NAME};
pub use transport::{ReqwestTransport, DEFAULT_READ_TIMEOUT};
