//! # Stream Playback Core
//!
//! Turns an arbitrarily chunked audio byte stream into fixed-rate stereo PCM
//! while extracting ICY metadata interleaved by Shoutcast/Icecast servers.
//!
//! ## Overview
//!
//! This crate handles:
//! - ICY metadata demultiplexing across chunk boundaries ([`icy`])
//! - Decoding through pluggable backends ([`Decoder`], [`decoder`])
//! - Sample rate conversion into a fixed-capacity ring buffer ([`resampler`])
//! - A lock-guarded player facade for one producer and one consumer ([`Player`])
//! - A blocking feeder loop for sockets and files ([`streaming`])

pub mod config;
pub mod decoder;
pub mod error;
pub mod icy;
pub mod metadata;
pub mod player;
pub mod resampler;
pub mod ring_buffer;
pub mod streaming;
pub mod traits;

pub use config::{PlayerConfig, PlayerState, PlayerStats};
pub use decoder::{DecoderSession, RawPcmDecoder, TrackerDecoder, TrackerModule};
pub use error::{PlaybackError, Result};
pub use icy::{IcyDemuxer, MetadataRecord};
pub use metadata::{MetaKey, MetaValue, MetadataSink, MetadataStore};
pub use player::{Player, ReadStatus};
pub use resampler::{LinearResampler, Resample, SampleRateConverter};
pub use ring_buffer::RingBuffer;
pub use streaming::{FeederStats, StreamFeeder};
pub use traits::{DecodeOutput, DecodeStatus, Decoder, SamplePair, StreamFormat, TagUpdate};

#[cfg(feature = "core-decoder")]
pub use decoder::SymphoniaDecoder;
