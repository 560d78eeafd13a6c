//! # Player Configuration
//!
//! Configuration, lifecycle state and counters for the stream player.

use serde::{Deserialize, Serialize};

/// Largest ICY metadata frame (255 × 16 bytes) plus a terminator byte.
pub const ICY_METADATA_BOUND: usize = 16 * 256 + 1;

/// Player configuration.
///
/// Controls the output rate, buffer sizes and the metadata accumulation bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Output sample rate delivered by `read`, in Hz.
    ///
    /// Default: 44100.
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,

    /// Capacity of the output ring buffer in sample pairs.
    ///
    /// Default: 16384 pairs (~370ms at 44.1kHz).
    #[serde(default = "default_ring_capacity_frames")]
    pub ring_capacity_frames: usize,

    /// Maximum frames pulled from the decoder per read step.
    ///
    /// Default: 4096 frames (~93ms at 44.1kHz).
    #[serde(default = "default_decode_chunk_frames")]
    pub decode_chunk_frames: usize,

    /// Upper bound on accumulated metadata text per frame, in bytes.
    ///
    /// Default: 16 × 256 + 1, enough for any frame the length byte can declare.
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: usize,

    /// Chunk size used by [`StreamFeeder`](crate::streaming::StreamFeeder).
    ///
    /// Default: 8 KB.
    #[serde(default = "default_feed_chunk_bytes")]
    pub feed_chunk_bytes: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: default_target_sample_rate(),
            ring_capacity_frames: default_ring_capacity_frames(),
            decode_chunk_frames: default_decode_chunk_frames(),
            max_metadata_bytes: default_max_metadata_bytes(),
            feed_chunk_bytes: default_feed_chunk_bytes(),
        }
    }
}

impl PlayerConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Small ring buffer
    /// - Small decode and feed steps
    pub fn low_latency() -> Self {
        Self {
            ring_capacity_frames: 4096,
            decode_chunk_frames: 1024,
            feed_chunk_bytes: 2 * 1024,
            ..Default::default()
        }
    }

    /// Create a configuration optimized for throughput.
    ///
    /// - Large ring buffer
    /// - Larger decode and feed steps for efficiency
    pub fn high_quality() -> Self {
        Self {
            ring_capacity_frames: 65536,
            decode_chunk_frames: 8192,
            feed_chunk_bytes: 32 * 1024,
            ..Default::default()
        }
    }

    /// Set the output sample rate.
    pub fn with_target_sample_rate(mut self, hz: u32) -> Self {
        self.target_sample_rate = hz;
        self
    }

    /// Set the metadata accumulation bound.
    pub fn with_max_metadata_bytes(mut self, bytes: usize) -> Self {
        self.max_metadata_bytes = bytes;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.target_sample_rate == 0 {
            return Err("target_sample_rate must be > 0".to_string());
        }

        if self.decode_chunk_frames == 0 {
            return Err("decode_chunk_frames must be > 0".to_string());
        }

        if self.ring_capacity_frames < self.decode_chunk_frames {
            return Err("ring_capacity_frames cannot be smaller than decode_chunk_frames".to_string());
        }

        if self.max_metadata_bytes == 0 {
            return Err("max_metadata_bytes must be > 0".to_string());
        }

        if self.feed_chunk_bytes == 0 {
            return Err("feed_chunk_bytes must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_target_sample_rate() -> u32 {
    44100
}

fn default_ring_capacity_frames() -> usize {
    16384
}

fn default_decode_chunk_frames() -> usize {
    4096
}

fn default_max_metadata_bytes() -> usize {
    ICY_METADATA_BOUND
}

fn default_feed_chunk_bytes() -> usize {
    8 * 1024
}

// ============================================================================
// Player State
// ============================================================================

/// Lifecycle of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    /// No decoder session opened yet.
    Unopened,
    /// Decoder opened, no audio produced yet.
    Opened,
    /// Samples have been delivered to the consumer.
    Streaming,
    /// Source exhausted and every buffered sample delivered.
    Ended,
}

impl PlayerState {
    /// Returns `true` once the decoder session is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Opened | Self::Streaming)
    }

    /// Returns `true` in the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

/// Counters describing what a player has processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    /// Raw bytes received through `feed`, metadata included.
    pub bytes_received: u64,
    /// Payload bytes handed to the decoder.
    pub payload_bytes: u64,
    /// Metadata frames completed (heartbeat frames included).
    pub metadata_frames: u64,
    /// Metadata frames truncated to the accumulation bound.
    pub protocol_violations: u64,
    /// Sample pairs delivered to the consumer.
    pub pairs_delivered: u64,
    /// `read` calls that produced nothing while the stream was live.
    pub starved_reads: u64,
}

impl PlayerStats {
    /// Fraction of received bytes that were audio payload (0.0 to 1.0).
    pub fn payload_ratio(&self) -> f64 {
        if self.bytes_received == 0 {
            return 0.0;
        }
        self.payload_bytes as f64 / self.bytes_received as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_sample_rate, 44100);
        assert_eq!(config.max_metadata_bytes, 4097);
    }

    #[test]
    fn test_presets_are_valid() {
        let low = PlayerConfig::low_latency();
        let high = PlayerConfig::high_quality();
        assert!(low.validate().is_ok());
        assert!(high.validate().is_ok());
        assert!(low.ring_capacity_frames < PlayerConfig::default().ring_capacity_frames);
        assert!(high.ring_capacity_frames > PlayerConfig::default().ring_capacity_frames);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PlayerConfig::default();

        config.target_sample_rate = 0;
        assert!(config.validate().is_err());
        config.target_sample_rate = 48000;

        config.ring_capacity_frames = config.decode_chunk_frames - 1;
        assert!(config.validate().is_err());
        config.ring_capacity_frames = 16384;

        config.max_metadata_bytes = 0;
        assert!(config.validate().is_err());
        config.max_metadata_bytes = 64;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: PlayerConfig = serde_json::from_str(r#"{"target_sample_rate": 48000}"#).unwrap();
        assert_eq!(config.target_sample_rate, 48000);
        assert_eq!(config.decode_chunk_frames, 4096);
        assert_eq!(config.max_metadata_bytes, ICY_METADATA_BOUND);
    }

    #[test]
    fn test_player_state() {
        assert!(!PlayerState::Unopened.is_open());
        assert!(PlayerState::Opened.is_open());
        assert!(PlayerState::Streaming.is_open());
        assert!(PlayerState::Ended.is_terminal());
        assert!(!PlayerState::Streaming.is_terminal());
    }

    #[test]
    fn test_payload_ratio() {
        let mut stats = PlayerStats::default();
        assert_eq!(stats.payload_ratio(), 0.0);
        stats.bytes_received = 200;
        stats.payload_bytes = 150;
        assert!((stats.payload_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
