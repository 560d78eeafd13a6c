//! # Player
//!
//! Composes the ICY demultiplexer, the decoder session and the sample rate
//! converter behind one lock.
//!
//! ```text
//! feed(bytes) ─► IcyDemuxer ─► payload ─► DecoderSession ─► i16 PCM
//!                    │                         │               │
//!                    └─ records ─► MetadataStore ◄─ tags       ▼
//!                                                     SampleRateConverter
//!                                                              │
//! read(pairs) ◄───────────────────────── RingBuffer ◄──────────┘
//! ```
//!
//! ## Threading
//!
//! One producer thread calls [`Player::feed`] and one consumer thread calls
//! [`Player::read`]. Every operation runs inside a single exclusive region, so
//! feed and read never overlap each other or themselves. Neither call waits for
//! data: a read with nothing to deliver returns `Produced(0)` and the caller
//! tries again later. The [`MetadataStore`] has its own lock and can be read at
//! any time.
//!
//! ## Usage
//!
//! ```rust
//! use core_playback::{MetaKey, Player, PlayerConfig, RawPcmDecoder, ReadStatus, SamplePair, StreamFormat};
//!
//! # fn main() -> core_playback::Result<()> {
//! let decoder = RawPcmDecoder::new(StreamFormat::cd_quality());
//! let player = Player::new(Box::new(decoder), PlayerConfig::default())?;
//!
//! player.set_parameter("icy-interval", 4);
//! player.feed(&[1, 0, 2, 0, 1])?;
//! player.feed(b"StreamTitle='X';")?;
//! player.finish()?;
//!
//! assert_eq!(player.metadata().text(MetaKey::SubTitle).as_deref(), Some("X"));
//!
//! let mut pairs = [SamplePair::SILENCE; 64];
//! assert_eq!(player.read(&mut pairs)?, ReadStatus::Produced(1));
//! assert_eq!(player.read(&mut pairs)?, ReadStatus::EndOfStream);
//! # Ok(())
//! # }
//! ```

use crate::config::{PlayerConfig, PlayerState, PlayerStats};
use crate::decoder::DecoderSession;
use crate::error::{PlaybackError, Result};
use crate::icy::IcyDemuxer;
use crate::metadata::{MetaKey, MetadataSink, MetadataStore};
use crate::resampler::SampleRateConverter;
use crate::traits::{DecodeStatus, Decoder, SamplePair};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Result of a successful [`Player::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Pairs written to the front of the output slice. Zero means "try again".
    Produced(usize),
    /// Source exhausted and every buffered pair delivered.
    EndOfStream,
}

impl ReadStatus {
    /// Integer form: the pair count, or `-1` at end of stream.
    pub fn as_raw(&self) -> i32 {
        match self {
            ReadStatus::Produced(count) => i32::try_from(*count).unwrap_or(i32::MAX),
            ReadStatus::EndOfStream => -1,
        }
    }

    pub fn produced(&self) -> usize {
        match self {
            ReadStatus::Produced(count) => *count,
            ReadStatus::EndOfStream => 0,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ReadStatus::EndOfStream)
    }
}

struct PlayerInner {
    session: DecoderSession,
    demuxer: IcyDemuxer,
    converter: SampleRateConverter,
    scratch: Vec<i16>,
    decode_chunk_frames: usize,
    state: PlayerState,
    stats: PlayerStats,
    fed: bool,
    file_source: bool,
    open_failure: Option<String>,
}

impl PlayerInner {
    fn new(decoder: Box<dyn Decoder>, config: &PlayerConfig) -> Self {
        Self {
            session: DecoderSession::new(decoder),
            demuxer: IcyDemuxer::new(config.max_metadata_bytes),
            converter: SampleRateConverter::new(
                config.target_sample_rate,
                config.ring_capacity_frames,
            ),
            scratch: Vec::new(),
            decode_chunk_frames: config.decode_chunk_frames,
            state: PlayerState::Unopened,
            stats: PlayerStats::default(),
            fed: false,
            file_source: false,
            open_failure: None,
        }
    }

    /// Open the session on first use. A failed open is latched and reported
    /// again by every later call.
    fn open(&mut self) -> Result<()> {
        if let Some(message) = &self.open_failure {
            return Err(PlaybackError::OpenFailure(message.clone()));
        }
        if self.state != PlayerState::Unopened {
            return Ok(());
        }
        match self.session.open() {
            Ok(()) => {
                self.state = PlayerState::Opened;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Decoder open failed");
                self.open_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn feed(&mut self, bytes: &[u8], sink: &dyn MetadataSink) -> Result<()> {
        self.open()?;
        if bytes.is_empty() {
            return Ok(());
        }
        self.fed = true;
        self.stats.bytes_received += bytes.len() as u64;

        let demuxed = self.demuxer.process(bytes);

        for segment in &demuxed.payload {
            self.session.feed(segment)?;
            self.stats.payload_bytes += segment.len() as u64;
        }

        self.stats.protocol_violations += demuxed.violations.len() as u64;

        for record in &demuxed.records {
            self.stats.metadata_frames += 1;
            let entries = record.sink_entries();
            if entries.is_empty() {
                continue;
            }
            if let Some(title) = record.get("StreamTitle") {
                info!(title, "Stream title updated");
            }
            sink.apply(&entries);
        }

        self.session.refresh_tags(sink);
        Ok(())
    }

    fn read(&mut self, out: &mut [SamplePair], sink: &dyn MetadataSink) -> Result<ReadStatus> {
        if self.state == PlayerState::Ended {
            return Ok(ReadStatus::EndOfStream);
        }
        if !self.fed && !self.file_source && !self.session.stream_ended() {
            return Ok(ReadStatus::Produced(0));
        }
        if out.is_empty() {
            return Ok(ReadStatus::Produced(0));
        }

        let mut produced = self.converter.read(out);
        let mut source_done = false;

        while produced < out.len() {
            let known_format = self.session.format();
            // The ratio must be current before the pull is sized against it.
            let rate_budget = match known_format {
                Some(format) => {
                    self.converter.set_rate(format.sample_rate);
                    self.converter.input_budget()
                }
                None => self.converter.unknown_rate_budget(),
            };
            let budget = (out.len() - produced)
                .min(self.decode_chunk_frames)
                .min(rate_budget);
            if budget == 0 {
                break;
            }

            let channels = known_format.map_or(1, |format| usize::from(format.channels).max(1));
            let len = budget * channels;
            if self.scratch.len() < len {
                self.scratch.resize(len, 0);
            }

            let output = self.session.read(&mut self.scratch[..len])?;

            if let DecodeStatus::Error(code) = output.status {
                error!(code, decoder = self.session.decoder_name(), "Decoder error");
                return Err(PlaybackError::DecodeError {
                    code,
                    message: format!("{} decoder failed", self.session.decoder_name()),
                });
            }

            if let Some(format) = self.session.format() {
                self.converter.set_rate(format.sample_rate);
                if output.frames > 0 {
                    let samples = output.frames * usize::from(format.channels);
                    self.converter
                        .write_interleaved(&self.scratch[..samples], format.channels);
                }
            }
            produced += self.converter.read(&mut out[produced..]);

            match output.status {
                DecodeStatus::EndOfStream => {
                    source_done = true;
                    break;
                }
                DecodeStatus::NeedMoreInput => break,
                // Format learned without audio; size the next pull for it.
                _ if output.frames == 0 && known_format.is_none() && self.session.format().is_some() => {}
                _ if output.frames == 0 => break,
                _ => {}
            }
        }

        self.session.refresh_tags(sink);

        if produced > 0 {
            if self.state == PlayerState::Opened {
                self.state = PlayerState::Streaming;
            }
            self.stats.pairs_delivered += produced as u64;
            return Ok(ReadStatus::Produced(produced));
        }

        if source_done && self.converter.available() == 0 {
            info!(
                pairs_delivered = self.stats.pairs_delivered,
                "Playback reached end of stream"
            );
            self.state = PlayerState::Ended;
            return Ok(ReadStatus::EndOfStream);
        }

        self.stats.starved_reads += 1;
        Ok(ReadStatus::Produced(0))
    }
}

/// Streaming audio player: push stream bytes in, pull sample pairs out.
pub struct Player {
    inner: Mutex<PlayerInner>,
    metadata: Arc<MetadataStore>,
    config: PlayerConfig,
}

impl Player {
    /// Create a player for a pushed byte stream.
    ///
    /// The decoder is opened by the first `set_parameter` or `feed`.
    pub fn new(decoder: Box<dyn Decoder>, config: PlayerConfig) -> Result<Self> {
        config.validate().map_err(PlaybackError::InvalidConfig)?;
        info!(
            decoder = decoder.name(),
            target_sample_rate = config.target_sample_rate,
            "Creating stream player"
        );
        Ok(Self {
            inner: Mutex::new(PlayerInner::new(decoder, &config)),
            metadata: Arc::new(MetadataStore::new()),
            config,
        })
    }

    /// Create a player for a decoder that reads its own complete source, such
    /// as a file.
    ///
    /// The decoder is opened immediately and must report its output format.
    /// No bytes are fed; reads start right away.
    pub fn from_source(decoder: Box<dyn Decoder>, config: PlayerConfig) -> Result<Self> {
        let player = Self::new(decoder, config)?;
        player.exclusive(|inner| -> Result<()> {
            let format = inner.session.open_eager()?;
            inner.state = PlayerState::Opened;
            inner.file_source = true;
            inner.session.end_stream();
            inner.converter.set_rate(format.sample_rate);
            inner.session.refresh_tags(&*player.metadata);
            debug!(
                sample_rate = format.sample_rate,
                channels = format.channels,
                seekable = inner.session.is_seekable(),
                "Source opened"
            );
            Ok(())
        })?;
        Ok(player)
    }

    /// Run `f` with exclusive access to the pipeline.
    ///
    /// The lock is released when `f` returns, on every path.
    fn exclusive<T>(&self, f: impl FnOnce(&mut PlayerInner) -> T) -> T {
        let mut inner = self.inner.lock();
        f(&mut inner)
    }

    /// Set a stream parameter. Returns `false` for unrecognized names.
    ///
    /// - `icy-interval`: payload bytes between metadata frames; zero or
    ///   negative disables metadata.
    /// - `size`: total expected byte length, handed to the decoder once open.
    ///
    /// The first call opens the decoder, whatever the name.
    #[instrument(skip(self))]
    pub fn set_parameter(&self, name: &str, value: i64) -> bool {
        self.exclusive(|inner| {
            if let Err(e) = inner.open() {
                warn!(error = %e, "Decoder not opened");
            }
            match name {
                "icy-interval" => {
                    inner.demuxer.set_interval(value);
                    true
                }
                "size" => match u64::try_from(value) {
                    Ok(size) => {
                        let accepted = inner.session.set_total_size(size);
                        debug!(size, accepted, "Declared stream size");
                        true
                    }
                    Err(_) => {
                        warn!(value, "Ignoring negative stream size");
                        false
                    }
                },
                _ => {
                    debug!("Unrecognized parameter");
                    false
                }
            }
        })
    }

    /// Push raw stream bytes. The slice is not retained.
    #[instrument(skip(self, bytes), fields(len = bytes.len()), level = "trace")]
    pub fn feed(&self, bytes: &[u8]) -> Result<()> {
        self.exclusive(|inner| inner.feed(bytes, &*self.metadata))
    }

    /// Signal that no more bytes will be fed.
    #[instrument(skip(self))]
    pub fn finish(&self) -> Result<()> {
        self.exclusive(|inner| {
            inner.open()?;
            inner.session.end_stream();
            Ok(())
        })
    }

    /// Advisory size hint. Currently ignored.
    pub fn hint_length(&self, bytes: u64) {
        debug!(bytes, "Length hint ignored");
    }

    /// Pull up to `out.len()` pairs at the target rate.
    #[instrument(skip(self, out), fields(max = out.len()), level = "trace")]
    pub fn read(&self, out: &mut [SamplePair]) -> Result<ReadStatus> {
        self.exclusive(|inner| inner.read(out, &*self.metadata))
    }

    /// [`read`](Self::read) collapsed to an integer: the pair count, `-1` at
    /// end of stream, or a negative error code.
    pub fn read_raw(&self, out: &mut [SamplePair]) -> i32 {
        match self.read(out) {
            Ok(status) => status.as_raw(),
            Err(e) => e.code(),
        }
    }

    /// Reposition to `seconds` within sub-song `song`.
    ///
    /// Returns `false` for sources that cannot seek. On success, pairs
    /// buffered from before the seek are discarded.
    #[instrument(skip(self))]
    pub fn seek_to(&self, song: u32, seconds: f64) -> Result<bool> {
        self.exclusive(|inner| {
            if !inner.session.is_seekable() {
                debug!("Seek unsupported for this source");
                return Ok(false);
            }
            let position = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or_default();
            if !inner.session.seek(song, position)? {
                return Ok(false);
            }
            inner.converter.reset();
            if inner.state == PlayerState::Ended {
                inner.state = PlayerState::Opened;
            }
            inner.session.refresh_tags(&*self.metadata);
            info!(song, ?position, "Seek completed");
            Ok(true)
        })
    }

    /// Release the decoder. Later reads report end of stream.
    pub fn close(&self) {
        self.exclusive(|inner| {
            inner.session.close();
            inner.converter.reset();
            inner.state = PlayerState::Ended;
        })
    }

    pub fn state(&self) -> PlayerState {
        self.exclusive(|inner| inner.state)
    }

    pub fn stats(&self) -> PlayerStats {
        self.exclusive(|inner| inner.stats.clone())
    }

    pub fn is_seekable(&self) -> bool {
        self.exclusive(|inner| inner.session.is_seekable())
    }

    /// Shared metadata store, readable from any thread.
    pub fn metadata(&self) -> Arc<MetadataStore> {
        Arc::clone(&self.metadata)
    }

    /// Current stream title, if the server sent one.
    pub fn stream_title(&self) -> Option<String> {
        self.metadata.text(MetaKey::SubTitle)
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RawPcmDecoder;
    use crate::traits::StreamFormat;

    fn pcm_player(rate: u32) -> Player {
        let decoder = RawPcmDecoder::new(StreamFormat::new(rate, 2));
        Player::new(Box::new(decoder), PlayerConfig::default()).unwrap()
    }

    fn stereo_bytes(pairs: &[(i16, i16)]) -> Vec<u8> {
        pairs
            .iter()
            .flat_map(|(l, r)| [l.to_le_bytes(), r.to_le_bytes()])
            .flatten()
            .collect()
    }

    #[test]
    fn test_read_before_feed_is_zero() {
        let player = pcm_player(44100);
        let mut out = [SamplePair::SILENCE; 16];
        assert_eq!(player.read(&mut out).unwrap(), ReadStatus::Produced(0));
        assert_eq!(player.state(), PlayerState::Unopened);
    }

    #[test]
    fn test_pass_through_pcm() {
        let player = pcm_player(44100);
        player.feed(&stereo_bytes(&[(1, 2), (3, 4)])).unwrap();
        assert_eq!(player.state(), PlayerState::Opened);

        let mut out = [SamplePair::SILENCE; 16];
        assert_eq!(player.read(&mut out).unwrap(), ReadStatus::Produced(2));
        assert_eq!(&out[..2], &[SamplePair::new(1, 2), SamplePair::new(3, 4)]);
        assert_eq!(player.state(), PlayerState::Streaming);
    }

    #[test]
    fn test_end_of_stream_after_drain() {
        let player = pcm_player(44100);
        player.feed(&stereo_bytes(&[(5, 5)])).unwrap();
        player.finish().unwrap();

        let mut out = [SamplePair::SILENCE; 16];
        assert_eq!(player.read(&mut out).unwrap(), ReadStatus::Produced(1));
        assert_eq!(player.read_raw(&mut out), -1);
        assert_eq!(player.state(), PlayerState::Ended);
        assert_eq!(player.read_raw(&mut out), -1);
    }

    #[test]
    fn test_starved_read_counts() {
        let player = pcm_player(44100);
        player.feed(&[1]).unwrap();
        let mut out = [SamplePair::SILENCE; 4];
        assert_eq!(player.read(&mut out).unwrap(), ReadStatus::Produced(0));
        assert_eq!(player.stats().starved_reads, 1);
    }

    #[test]
    fn test_icy_title_reaches_store() {
        let player = pcm_player(44100);
        assert!(player.set_parameter("icy-interval", 4));

        let mut stream = stereo_bytes(&[(7, 8)]);
        stream.push(1);
        stream.extend_from_slice(b"StreamTitle='X';");
        stream.extend_from_slice(&stereo_bytes(&[(9, 10)]));
        player.feed(&stream).unwrap();

        assert_eq!(player.stream_title().as_deref(), Some("X"));
        let stats = player.stats();
        assert_eq!(stats.payload_bytes, 8);
        assert_eq!(stats.metadata_frames, 1);

        let mut out = [SamplePair::SILENCE; 4];
        assert_eq!(player.read(&mut out).unwrap(), ReadStatus::Produced(2));
        assert_eq!(out[1], SamplePair::new(9, 10));
    }

    #[test]
    fn test_resampled_output_rate() {
        let player = pcm_player(22050);
        let input: Vec<(i16, i16)> = (0..2000).map(|i| (i as i16, -(i as i16))).collect();
        player.feed(&stereo_bytes(&input)).unwrap();
        player.finish().unwrap();

        let mut out = vec![SamplePair::SILENCE; 512];
        let mut total = 0;
        loop {
            match player.read(&mut out).unwrap() {
                ReadStatus::Produced(0) => continue,
                ReadStatus::Produced(n) => total += n,
                ReadStatus::EndOfStream => break,
            }
        }
        // 22050 -> 44100 doubles the pair count
        assert!((3990..=4010).contains(&total), "got {total}");
    }

    #[test]
    fn test_unknown_parameter() {
        let player = pcm_player(44100);
        assert!(!player.set_parameter("bitrate", 128));
        assert_eq!(player.state(), PlayerState::Opened);
    }

    #[test]
    fn test_streamed_source_cannot_seek() {
        let player = pcm_player(44100);
        player.feed(&stereo_bytes(&[(1, 1)])).unwrap();
        assert!(!player.seek_to(0, 10.0).unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let decoder = RawPcmDecoder::new(StreamFormat::cd_quality());
        let config = PlayerConfig::default().with_target_sample_rate(0);
        assert!(matches!(
            Player::new(Box::new(decoder), config),
            Err(PlaybackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_close_ends_playback() {
        let player = pcm_player(44100);
        player.feed(&stereo_bytes(&[(1, 1)])).unwrap();
        player.close();
        let mut out = [SamplePair::SILENCE; 4];
        assert!(player.read(&mut out).unwrap().is_end());
    }
}
