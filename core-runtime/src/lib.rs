//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the file service core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Per-key single-flight execution
//!
//! Every other core crate depends on this one for its configuration types and
//! for the [`EventBus`](events::EventBus) it reports progress on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod single_flight;

pub use error::{Error, Result};
pub use single_flight::SingleFlight;
