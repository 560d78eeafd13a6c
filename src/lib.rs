//! Workspace facade crate.
//!
//! Re-exports the workspace members behind feature flags so a host can depend
//! on `stream-player-workspace` alone and pick the decoder backends it needs.

#[cfg(feature = "logging")]
pub use core_runtime as runtime;

#[cfg(feature = "playback")]
pub use core_playback as playback;
