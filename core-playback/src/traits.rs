//! # Core Playback Traits
//!
//! Shared sample types and the decoder capability the player is written
//! against.
//!
//! ## Architecture
//!
//! The pipeline is **push in, pull out**:
//!
//! - **Producer** calls [`Player::feed`](crate::player::Player::feed) with raw
//!   stream bytes. ICY metadata is stripped and the payload is pushed into a
//!   [`Decoder`].
//! - **Consumer** calls [`Player::read`](crate::player::Player::read). The
//!   decoder is asked for PCM, which is rate-converted into a ring buffer and
//!   drained into the caller's slice.
//!
//! Neither side ever blocks waiting for the other: a decoder with no input
//! answers [`DecodeStatus::NeedMoreInput`] and the consumer simply tries again.
//!
//! ## Backends
//!
//! A backend implements [`Decoder`]. Feed-mode backends (MP3 over HTTP) accept
//! bytes through [`Decoder::feed`]; file-mode backends open their own source and
//! may support [`Decoder::seek`]. Tracker-style backends report sub-songs through
//! tag updates (`songs`, `startsong`, `song`) and select them with `seek`.
//!
//! ```rust,no_run
//! use core_playback::{Decoder, DecodeStatus};
//!
//! fn drain(decoder: &mut dyn Decoder) -> core_playback::Result<usize> {
//!     let mut pcm = vec![0i16; 4096];
//!     let mut frames = 0;
//!     loop {
//!         let out = decoder.read(&mut pcm)?;
//!         frames += out.frames;
//!         match out.status {
//!             DecodeStatus::Ok | DecodeStatus::FormatChanged => continue,
//!             _ => return Ok(frames),
//!         }
//!     }
//! }
//! ```

use crate::error::Result;
use crate::metadata::{MetaKey, MetaValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Sample Types
// ============================================================================

/// One stereo frame of signed 16-bit PCM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SamplePair {
    pub left: i16,
    pub right: i16,
}

impl SamplePair {
    pub const SILENCE: SamplePair = SamplePair { left: 0, right: 0 };

    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Build a pair from one interleaved frame.
    ///
    /// Mono frames are duplicated to both channels; channels past the second
    /// are dropped.
    pub fn from_frame(frame: &[i16]) -> Self {
        match frame {
            [] => Self::SILENCE,
            [mono] => Self::new(*mono, *mono),
            [left, right, ..] => Self::new(*left, *right),
        }
    }
}

/// Native output format of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Standard CD quality (44.1 kHz stereo)
    pub fn cd_quality() -> Self {
        Self::new(44100, 2)
    }
}

// ============================================================================
// Decoder Output
// ============================================================================

/// Outcome of one [`Decoder::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Frames were produced (possibly zero) and more may follow.
    Ok,
    /// Frames were produced and the output format changed; re-query
    /// [`Decoder::format`] before interpreting later frames.
    FormatChanged,
    /// Decoder is starved and needs more input bytes.
    NeedMoreInput,
    /// Source exhausted permanently.
    EndOfStream,
    /// Decoder failure with a backend-specific code.
    Error(i32),
}

/// Frames written by [`Decoder::read`] plus the decoder's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutput {
    /// Interleaved frames written to the front of the output slice.
    pub frames: usize,
    pub status: DecodeStatus,
}

impl DecodeOutput {
    pub fn new(frames: usize, status: DecodeStatus) -> Self {
        Self { frames, status }
    }

    pub fn starved() -> Self {
        Self::new(0, DecodeStatus::NeedMoreInput)
    }
}

/// A batch of in-band tags published by a decoder.
///
/// `revision` increases whenever the decoder has new tag data; consumers apply
/// each revision at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct TagUpdate {
    pub revision: u64,
    pub entries: Vec<(MetaKey, MetaValue)>,
}

impl TagUpdate {
    pub fn new(revision: u64) -> Self {
        Self {
            revision,
            entries: Vec::new(),
        }
    }

    /// Append an entry.
    pub fn with(mut self, key: MetaKey, value: impl Into<MetaValue>) -> Self {
        self.entries.push((key, value.into()));
        self
    }
}

// ============================================================================
// Decoder Capability
// ============================================================================

/// Audio bit-stream decoder driven by the player.
///
/// ## Contract
///
/// - `open` is called once before any `feed` or `read`.
/// - `feed` copies the given bytes; the slice is not retained.
/// - `read` never blocks. With no decodable input it returns
///   [`DecodeStatus::NeedMoreInput`]; the session maps that to end of stream
///   once the producer has signalled it.
/// - `close` releases native resources and is called exactly once.
pub trait Decoder: Send {
    /// Short backend name used in logs and as the default `format` tag.
    fn name(&self) -> &str;

    /// Initialize the decoder.
    fn open(&mut self) -> Result<()>;

    /// Declare the total expected byte length of the stream.
    ///
    /// Returns `false` if the backend has no use for it.
    fn set_total_size(&mut self, _bytes: u64) -> bool {
        false
    }

    /// Push payload bytes. Feed-less backends ignore this.
    fn feed(&mut self, payload: &[u8]) -> Result<()>;

    /// No more bytes will be fed; buffered input may now be drained fully.
    fn end_of_input(&mut self) {}

    /// Decode into `out` as interleaved samples of [`format`](Self::format)'s
    /// channel count.
    fn read(&mut self, out: &mut [i16]) -> Result<DecodeOutput>;

    /// Native output format, once known.
    fn format(&self) -> Option<StreamFormat>;

    /// Total playing time, once known.
    fn length(&self) -> Option<Duration> {
        None
    }

    /// New in-band tag data since the last call, if any.
    fn poll_tags(&mut self) -> Option<TagUpdate> {
        None
    }

    /// Whether [`seek`](Self::seek) can reposition this source.
    fn is_seekable(&self) -> bool {
        false
    }

    /// Reposition to `position` within sub-song `song`.
    ///
    /// Returns `Ok(false)` when the source cannot seek.
    fn seek(&mut self, _song: u32, _position: Duration) -> Result<bool> {
        Ok(false)
    }

    /// Release native resources.
    fn close(&mut self);
}
