//! # Core Runtime Module
//!
//! Ambient runtime infrastructure shared by the streaming crates:
//! - Logging and tracing bootstrap
//! - Runtime error type
//!
//! The playback pipeline only ever emits `tracing` events; this crate decides
//! where they go.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
