//! # Decoder Backends
//!
//! Implementations of [`Decoder`](crate::traits::Decoder) plus the
//! [`DecoderSession`] feed adapter the player drives them through.
//!
//! ## Supported Backends
//!
//! | Backend | Input | Feature Flag | Seekable |
//! |---------|-------|--------------|----------|
//! | [`RawPcmDecoder`] | s16le interleaved PCM | always | no |
//! | `SymphoniaDecoder` (stream) | MP3/FLAC/Vorbis/WAV bytes | `decoder-mp3` et al. | no |
//! | `SymphoniaDecoder` (file) | local file | `decoder-mp3` et al. | yes |
//! | [`TrackerDecoder`] | [`TrackerModule`] description | always | yes, by sub-song |
//!
//! ## Architecture
//!
//! ```text
//! payload bytes → DecoderSession → dyn Decoder → interleaved i16 → SampleRateConverter
//!                       │
//!                       └── tag revisions → MetadataSink
//! ```
//!
//! The symphonia backend uses symphonia's three layers: a `MediaSource` (file,
//! or a shared queue of fed bytes), a `FormatReader` demuxing packets, and a
//! codec `Decoder` producing PCM.

mod raw_pcm;
mod session;
mod tracker;

#[cfg(feature = "core-decoder")]
mod format_detector;

#[cfg(feature = "core-decoder")]
mod sample_converter;

#[cfg(feature = "core-decoder")]
mod symphonia;

pub use raw_pcm::RawPcmDecoder;
pub use session::DecoderSession;
pub use tracker::{subsong_amplitude, TrackerDecoder, TrackerModule, HALF_PERIOD_FRAMES};

#[cfg(feature = "core-decoder")]
pub use self::symphonia::SymphoniaDecoder;

#[cfg(feature = "core-decoder")]
pub use format_detector::FormatDetector;

#[cfg(feature = "core-decoder")]
pub use sample_converter::SampleConverter;
