//! Workspace facade crate.
//!
//! Host applications depend on `media-cache-workspace` and enable the
//! documented features instead of wiring each workspace crate by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
