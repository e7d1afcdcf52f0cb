//! # Core Runtime Module
//!
//! Shared runtime infrastructure for the media cache core:
//! - Logging and tracing setup
//! - Configuration with fail-fast validation
//! - Event bus for cache change notifications
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions,
//! its configuration types and the [`EventBus`](events::EventBus) observers
//! subscribe to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{CacheEvent, CoreEvent, EventBus, EventStream};
