//! # Stream Feeder
//!
//! Producer loop for the player. Reads a blocking byte source (a socket, an
//! HTTP body reader, a file) and pushes it into a [`Player`] chunk by chunk.
//!
//! ## Architecture
//!
//! The feeder does NOT spawn threads. The host runs [`StreamFeeder::run`] on
//! whatever thread owns the source, while a consumer thread calls
//! [`Player::read`].
//!
//! ```text
//! ┌──────────────────────────────┐
//! │   StreamFeeder (Producer)    │
//! │  1. read chunk from source   │
//! │  2. Player::feed(chunk)      │
//! └──────────────┬───────────────┘
//!                │ raw stream bytes
//!                ▼
//! ┌──────────────────────────────┐
//! │            Player            │
//! └──────────────┬───────────────┘
//!                │ sample pairs
//!                ▼
//! ┌──────────────────────────────┐
//! │   Audio output (Consumer)    │
//! └──────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_playback::streaming::{icy_interval_from_headers, StreamFeeder};
//! use core_playback::{Player, PlayerConfig, SymphoniaDecoder};
//! use std::net::TcpStream;
//! use std::sync::Arc;
//!
//! # fn run(socket: TcpStream, headers: Vec<(String, String)>) -> core_playback::Result<()> {
//! let player = Arc::new(Player::new(
//!     Box::new(SymphoniaDecoder::streaming()),
//!     PlayerConfig::default(),
//! )?);
//!
//! if let Some(interval) = icy_interval_from_headers(&headers) {
//!     player.set_parameter("icy-interval", interval);
//! }
//!
//! let feeder = StreamFeeder::new(Arc::clone(&player));
//! let stats = feeder.run(socket)?;
//! println!("fed {} bytes", stats.bytes_fed);
//! # Ok(())
//! # }
//! ```

use crate::error::{PlaybackError, Result};
use crate::player::Player;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Response header carrying the metadata interval.
pub const ICY_METAINT_HEADER: &str = "icy-metaint";

/// Extract the metadata interval from HTTP response headers.
///
/// The header name is matched case-insensitively. Missing, non-numeric and
/// non-positive values yield `None`.
pub fn icy_interval_from_headers<K, V>(headers: &[(K, V)]) -> Option<i64>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    headers
        .iter()
        .find(|(name, _)| name.as_ref().eq_ignore_ascii_case(ICY_METAINT_HEADER))
        .and_then(|(_, value)| value.as_ref().trim().parse::<i64>().ok())
        .filter(|&interval| interval > 0)
}

/// Counters reported by [`StreamFeeder::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeederStats {
    /// Bytes read from the source and fed to the player.
    pub bytes_fed: u64,
    /// Non-empty reads performed.
    pub chunks: u64,
    /// Whether the source reached end of file (as opposed to cancellation).
    pub reached_eof: bool,
    /// Wall time spent in the loop.
    pub elapsed: Duration,
}

/// Pumps a blocking reader into a [`Player`].
pub struct StreamFeeder {
    player: Arc<Player>,
    chunk_bytes: usize,
    cancel: Arc<AtomicBool>,
}

impl StreamFeeder {
    /// Create a feeder using the player's configured chunk size.
    pub fn new(player: Arc<Player>) -> Self {
        let chunk_bytes = player.config().feed_chunk_bytes.max(1);
        Self {
            player,
            chunk_bytes,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the chunk size.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    /// Flag that stops the loop before its next read when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Feed `source` until end of file or cancellation.
    ///
    /// At end of file the player is told the stream has ended. Cancellation
    /// leaves the stream open. Interrupted reads are retried; other read
    /// errors end the loop with [`PlaybackError::SourceError`].
    #[instrument(skip(self, source), fields(chunk_bytes = self.chunk_bytes))]
    pub fn run<R: Read>(&self, mut source: R) -> Result<FeederStats> {
        info!("Starting stream feeder");
        let start = Instant::now();
        let mut stats = FeederStats::default();
        let mut chunk = vec![0u8; self.chunk_bytes];

        loop {
            if self.cancel.load(Ordering::Acquire) {
                info!(bytes_fed = stats.bytes_fed, "Stream feeder cancelled");
                break;
            }

            let read = match source.read(&mut chunk) {
                Ok(0) => {
                    debug!("Source reached end of file");
                    self.player.finish()?;
                    stats.reached_eof = true;
                    break;
                }
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Source read failed");
                    return Err(PlaybackError::SourceError(e.to_string()));
                }
            };

            self.player.feed(&chunk[..read])?;
            stats.bytes_fed += read as u64;
            stats.chunks += 1;
        }

        stats.elapsed = start.elapsed();
        info!(
            bytes_fed = stats.bytes_fed,
            chunks = stats.chunks,
            "Stream feeder finished in {:.2}s",
            stats.elapsed.as_secs_f64()
        );
        Ok(stats)
    }
}
