//! # Symphonia Decoder
//!
//! Compressed-audio backend built on symphonia.
//!
//! ## Modes
//!
//! - **Streaming** ([`SymphoniaDecoder::streaming`]): bytes arrive through
//!   [`Decoder::feed`] and are queued in a shared buffer that symphonia reads
//!   as its `MediaSource`. Probing waits until [`PROBE_THRESHOLD`] bytes are
//!   queued (or input ends), and packets are only pulled while at least
//!   [`PULL_WATERMARK`] bytes are queued so a frame is not cut short while the
//!   stream is still live. Format detection only peeks at the queue; a failed
//!   attempt on a live stream is retried once twice as many bytes are queued,
//!   up to [`PROBE_LIMIT`].
//! - **File** ([`SymphoniaDecoder::open_file`]): the file is probed at
//!   construction and can be repositioned with [`Decoder::seek`].

use crate::decoder::format_detector::FormatDetector;
use crate::decoder::sample_converter::SampleConverter;
use crate::error::{PlaybackError, Result};
use crate::metadata::{MetaKey, MetaValue};
use crate::traits::{DecodeOutput, DecodeStatus, Decoder, StreamFormat, TagUpdate};
use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, error, info, instrument, warn};

/// Queued bytes required before a live stream is probed.
pub const PROBE_THRESHOLD: usize = 16 * 1024;

/// Queued bytes required before packets are pulled from a live stream.
pub const PULL_WATERMARK: usize = 8 * 1024;

/// Live bytes after which a failing probe is final even before end of input.
pub const PROBE_LIMIT: usize = 1024 * 1024;

const MAX_CONSECUTIVE_ERRORS: usize = 10;

const ERR_PROBE: i32 = -20;
const ERR_PACKET: i32 = -21;
const ERR_DECODE: i32 = -22;
const ERR_RESET: i32 = -23;

// ============================================================================
// Live Input
// ============================================================================

#[derive(Default)]
struct InputQueue {
    bytes: BytesMut,
    ended: bool,
    /// While probing, reads peek from this offset instead of consuming.
    peek: Option<usize>,
}

/// Fed bytes shared between the decoder and symphonia's reader.
#[derive(Clone, Default)]
struct SharedInput {
    queue: Arc<Mutex<InputQueue>>,
}

impl SharedInput {
    fn push(&self, payload: &[u8]) {
        self.queue.lock().bytes.extend_from_slice(payload);
    }

    fn finish(&self) {
        self.queue.lock().ended = true;
    }

    fn buffered(&self) -> usize {
        self.queue.lock().bytes.len()
    }

    fn is_ended(&self) -> bool {
        self.queue.lock().ended
    }

    fn clear(&self) {
        let mut queue = self.queue.lock();
        queue.bytes.clear();
        queue.peek = None;
    }

    /// Switch reads to peeking so failed format detection can start over.
    fn begin_peek(&self) {
        self.queue.lock().peek = Some(0);
    }

    /// Drop the bytes read while peeking and resume consuming reads.
    fn commit_peek(&self) {
        let mut queue = self.queue.lock();
        if let Some(offset) = queue.peek.take() {
            queue.bytes.advance(offset);
        }
    }

    /// Forget the peek position, keeping every queued byte.
    fn rewind_peek(&self) {
        self.queue.lock().peek = None;
    }
}

impl Read for SharedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.queue.lock();
        let start = queue.peek.unwrap_or(0);
        let count = buf.len().min(queue.bytes.len() - start);
        buf[..count].copy_from_slice(&queue.bytes[start..start + count]);
        match queue.peek.as_mut() {
            Some(offset) => *offset += count,
            None => queue.bytes.advance(count),
        }
        Ok(count)
    }
}

impl Seek for SharedInput {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "live stream is not seekable",
        ))
    }
}

impl MediaSource for SharedInput {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

// ============================================================================
// Probed Pipeline
// ============================================================================

struct Pipeline {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
}

struct TrackInfo {
    label: &'static str,
    format: Option<StreamFormat>,
    length: Option<Duration>,
    tags: Vec<(MetaKey, MetaValue)>,
}

impl Pipeline {
    fn probe(source: Box<dyn MediaSource>, hint: &Hint) -> std::result::Result<(Self, TrackInfo), String> {
        let stream = MediaSourceStream::new(source, MediaSourceStreamOptions::default());
        let mut probed = symphonia::default::get_probe()
            .format(
                hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| format!("format probe failed: {}", e))?;

        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| "no decodable audio track".to_string())?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| format!("codec unavailable: {}", e))?;

        let format = match (params.sample_rate, params.channels) {
            (Some(rate), Some(channels)) if rate > 0 && channels.count() > 0 => {
                Some(StreamFormat::new(rate, channels.count() as u16))
            }
            _ => None,
        };
        let length = match (params.n_frames, params.sample_rate) {
            (Some(frames), Some(rate)) if rate > 0 => {
                Some(Duration::from_secs_f64(frames as f64 / f64::from(rate)))
            }
            _ => None,
        };

        let mut tags = Vec::new();
        if let Some(metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.current() {
                merge_tags(&mut tags, tag_entries(revision));
            }
        }
        if let Some(revision) = probed.format.metadata().current() {
            merge_tags(&mut tags, tag_entries(revision));
        }

        let info = TrackInfo {
            label: FormatDetector::codec_label(params.codec),
            format,
            length,
            tags,
        };
        let pipeline = Self {
            reader: probed.format,
            codec,
            track_id,
        };
        Ok((pipeline, info))
    }
}

fn tag_entries(revision: &MetadataRevision) -> Vec<(MetaKey, MetaValue)> {
    revision
        .tags()
        .iter()
        .filter_map(|tag| {
            let key = match tag.std_key? {
                StandardTagKey::TrackTitle => MetaKey::Title,
                StandardTagKey::Artist => MetaKey::Composer,
                StandardTagKey::Comment => MetaKey::Message,
                _ => return None,
            };
            Some((key, MetaValue::Text(tag.value.to_string())))
        })
        .collect()
}

/// Replace or append entries. Returns whether anything changed.
fn merge_tags(tags: &mut Vec<(MetaKey, MetaValue)>, entries: Vec<(MetaKey, MetaValue)>) -> bool {
    let mut changed = false;
    for (key, value) in entries {
        match tags.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, current)) if *current == value => {}
            Some((_, current)) => {
                *current = value;
                changed = true;
            }
            None => {
                tags.push((key, value));
                changed = true;
            }
        }
    }
    changed
}

// ============================================================================
// Decoder
// ============================================================================

enum Source {
    Stream(SharedInput),
    File(PathBuf),
}

/// Symphonia-backed [`Decoder`] for MP3 and the other enabled codecs.
pub struct SymphoniaDecoder {
    source: Source,
    hint: Option<Hint>,
    pipeline: Option<Pipeline>,
    converter: SampleConverter,
    pcm: Vec<i16>,
    pcm_pos: usize,
    format: Option<StreamFormat>,
    next_format: Option<StreamFormat>,
    length: Option<Duration>,
    tags: Vec<(MetaKey, MetaValue)>,
    tag_revision: u64,
    published_revision: u64,
    next_probe_at: usize,
    exhausted: bool,
    failed: Option<i32>,
}

impl SymphoniaDecoder {
    /// Decoder for a live byte stream, format detected by probing.
    pub fn streaming() -> Self {
        Self::streaming_with_hint(Hint::new())
    }

    /// Decoder for a live byte stream with a probe hint, for example from
    /// [`FormatDetector::hint_from_content_type`].
    pub fn streaming_with_hint(hint: Hint) -> Self {
        Self::with_source(Source::Stream(SharedInput::default()), Some(hint))
    }

    /// Open and probe a local file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            error!("Failed to open file: {}", e);
            PlaybackError::OpenFailure(format!("{}: {}", path.display(), e))
        })?;

        let hint = FormatDetector::hint_from_path(path);
        let (pipeline, info) = Pipeline::probe(Box::new(file), &hint).map_err(|message| {
            error!("{}", message);
            PlaybackError::OpenFailure(message)
        })?;

        let mut decoder = Self::with_source(Source::File(path.to_path_buf()), None);
        decoder.install(pipeline, info);
        Ok(decoder)
    }

    fn with_source(source: Source, hint: Option<Hint>) -> Self {
        Self {
            source,
            hint,
            pipeline: None,
            converter: SampleConverter::new(),
            pcm: Vec::new(),
            pcm_pos: 0,
            format: None,
            next_format: None,
            length: None,
            tags: Vec::new(),
            tag_revision: 0,
            published_revision: 0,
            next_probe_at: PROBE_THRESHOLD,
            exhausted: false,
            failed: None,
        }
    }

    fn install(&mut self, pipeline: Pipeline, info: TrackInfo) {
        info!(
            codec = info.label,
            sample_rate = info.format.map(|f| f.sample_rate),
            channels = info.format.map(|f| f.channels),
            length = ?info.length,
            "Symphonia pipeline ready"
        );
        self.pipeline = Some(pipeline);
        self.format = info.format;
        self.length = info.length;

        let mut entries = info.tags;
        entries.push((MetaKey::Format, MetaValue::from(info.label)));
        if let Some(format) = info.format {
            entries.push((MetaKey::Channels, MetaValue::from(format.channels)));
        }
        // Files expose their decoded track as the only sub-song.
        if matches!(self.source, Source::File(_)) {
            entries.push((MetaKey::Songs, MetaValue::from(1u32)));
            entries.push((MetaKey::StartSong, MetaValue::from(0u32)));
            entries.push((MetaKey::Song, MetaValue::from(1u32)));
        }
        merge_tags(&mut self.tags, entries);
        self.tag_revision += 1;
    }

    fn source_ended(&self) -> bool {
        match &self.source {
            Source::Stream(input) => input.is_ended(),
            Source::File(_) => true,
        }
    }

    fn may_pull(&self) -> bool {
        match &self.source {
            Source::Stream(input) => input.is_ended() || input.buffered() >= PULL_WATERMARK,
            Source::File(_) => true,
        }
    }

    /// Probe a live stream once enough bytes are queued.
    ///
    /// The probe only peeks at the queue. If it fails while the stream is
    /// still live (a large leading tag, say), every byte stays queued and the
    /// probe is retried once the queue has doubled. Returns whether a
    /// pipeline is ready.
    fn try_probe(&mut self) -> std::result::Result<bool, i32> {
        let Source::Stream(input) = &self.source else {
            return Ok(false);
        };
        let input = input.clone();
        let buffered = input.buffered();
        let ended = input.is_ended();

        if ended && buffered == 0 {
            self.exhausted = true;
            return Ok(false);
        }
        if buffered < self.next_probe_at && !ended {
            return Ok(false);
        }

        let hint = self.hint.clone().unwrap_or_default();
        debug!(buffered, ended, "Probing live stream");
        input.begin_peek();
        match Pipeline::probe(Box::new(input.clone()), &hint) {
            Ok((pipeline, info)) => {
                input.commit_peek();
                self.hint = None;
                self.install(pipeline, info);
                Ok(true)
            }
            Err(message) if !ended && buffered < PROBE_LIMIT => {
                input.rewind_peek();
                self.next_probe_at = buffered * 2;
                debug!(
                    buffered,
                    next_probe_at = self.next_probe_at,
                    "Probe incomplete, waiting for more input: {}",
                    message
                );
                Ok(false)
            }
            Err(message) => {
                input.rewind_peek();
                error!("{}", message);
                Err(ERR_PROBE)
            }
        }
    }

    /// Decode the next packet of the selected track into `pcm`.
    ///
    /// `Ok(None)` means no packet is available right now (or the source is
    /// exhausted, which sets `exhausted`).
    fn decode_packet(&mut self) -> std::result::Result<Option<StreamFormat>, i32> {
        let source_ended = self.source_ended();
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(None);
        };
        let mut consecutive_errors = 0;

        loop {
            let packet = match pipeline.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    if source_ended {
                        debug!("Reached end of stream");
                        self.exhausted = true;
                    }
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Track list changed, decoder reset required");
                    return Err(ERR_RESET);
                }
                Err(e) => {
                    error!("Failed to read packet: {}", e);
                    return Err(ERR_PACKET);
                }
            };

            if let Some(revision) = pipeline.reader.metadata().skip_to_latest() {
                if merge_tags(&mut self.tags, tag_entries(revision)) {
                    self.tag_revision += 1;
                }
            }

            if packet.track_id() != pipeline.track_id {
                continue;
            }

            match pipeline.codec.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let before = self.pcm.len();
                    let format = self.converter.append_interleaved(decoded, &mut self.pcm);
                    if format.channels == 0 || format.sample_rate == 0 {
                        warn!("Skipping packet without a channel layout");
                        self.pcm.truncate(before);
                        continue;
                    }
                    return Ok(Some(format));
                }
                Err(SymphoniaError::DecodeError(message)) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping packet with decode error (attempt {}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_ERRORS, message
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("Too many consecutive decode errors");
                        return Err(ERR_DECODE);
                    }
                }
                Err(e) => {
                    error!("Fatal decode error: {}", e);
                    return Err(ERR_DECODE);
                }
            }
        }
    }

    /// Move buffered PCM into `out[written..]`, whole frames only.
    fn drain_pcm(&mut self, out: &mut [i16], written: usize, channels: usize) -> usize {
        let room = (out.len() - written) / channels * channels;
        let count = room.min(self.pcm.len() - self.pcm_pos);
        out[written..written + count]
            .copy_from_slice(&self.pcm[self.pcm_pos..self.pcm_pos + count]);
        self.pcm_pos += count;
        if self.pcm_pos == self.pcm.len() {
            self.pcm.clear();
            self.pcm_pos = 0;
        }
        count
    }

    fn idle_status(&self) -> DecodeStatus {
        if self.exhausted {
            DecodeStatus::EndOfStream
        } else {
            DecodeStatus::NeedMoreInput
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn name(&self) -> &str {
        "symphonia"
    }

    fn open(&mut self) -> Result<()> {
        match &self.source {
            Source::Stream(_) => debug!("Live stream decoder opened, probe deferred"),
            Source::File(path) => debug!(path = %path.display(), "File decoder opened"),
        }
        Ok(())
    }

    fn feed(&mut self, payload: &[u8]) -> Result<()> {
        if let Source::Stream(input) = &self.source {
            input.push(payload);
        }
        Ok(())
    }

    fn end_of_input(&mut self) {
        if let Source::Stream(input) = &self.source {
            input.finish();
        }
    }

    fn read(&mut self, out: &mut [i16]) -> Result<DecodeOutput> {
        if let Some(code) = self.failed {
            return Ok(DecodeOutput::new(0, DecodeStatus::Error(code)));
        }

        if self.pipeline.is_none() {
            match self.try_probe() {
                Ok(true) => {}
                Ok(false) => return Ok(DecodeOutput::new(0, self.idle_status())),
                Err(code) => {
                    self.failed = Some(code);
                    return Ok(DecodeOutput::new(0, DecodeStatus::Error(code)));
                }
            }
        }

        let mut changed = false;
        if let Some(format) = self.next_format.take() {
            self.format = Some(format);
            changed = true;
        }

        let mut written = 0;
        loop {
            if let Some(format) = self.format {
                let channels = usize::from(format.channels);
                written += self.drain_pcm(out, written, channels);
                if out.len() - written < channels {
                    break;
                }
            }
            if self.exhausted || !self.may_pull() {
                break;
            }

            match self.decode_packet() {
                Ok(Some(format)) if self.format != Some(format) => {
                    if written > 0 {
                        self.next_format = Some(format);
                        break;
                    }
                    debug!(
                        sample_rate = format.sample_rate,
                        channels = format.channels,
                        "Decoder output format changed"
                    );
                    self.format = Some(format);
                    changed = true;
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(code) => {
                    self.failed = Some(code);
                    return Ok(DecodeOutput::new(0, DecodeStatus::Error(code)));
                }
            }
        }

        let frames = self
            .format
            .map_or(0, |format| written / usize::from(format.channels));
        let status = if changed {
            DecodeStatus::FormatChanged
        } else if frames > 0 {
            DecodeStatus::Ok
        } else {
            self.idle_status()
        };
        Ok(DecodeOutput::new(frames, status))
    }

    fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    fn length(&self) -> Option<Duration> {
        self.length
    }

    fn poll_tags(&mut self) -> Option<TagUpdate> {
        if self.tag_revision == self.published_revision {
            return None;
        }
        self.published_revision = self.tag_revision;
        Some(TagUpdate {
            revision: self.tag_revision,
            entries: self.tags.clone(),
        })
    }

    fn is_seekable(&self) -> bool {
        matches!(self.source, Source::File(_)) && self.pipeline.is_some()
    }

    fn seek(&mut self, song: u32, position: Duration) -> Result<bool> {
        if !self.is_seekable() || song != 0 {
            return Ok(false);
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(false);
        };

        let time = Time::from(position.as_secs_f64());
        match pipeline.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(pipeline.track_id),
            },
        ) {
            Ok(seeked) => {
                pipeline.codec.reset();
                self.pcm.clear();
                self.pcm_pos = 0;
                self.exhausted = false;
                info!(?position, actual_ts = seeked.actual_ts, "Seek completed");
                Ok(true)
            }
            Err(e) => {
                warn!(?position, "Seek failed: {}", e);
                Ok(false)
            }
        }
    }

    fn close(&mut self) {
        self.pipeline = None;
        self.pcm.clear();
        self.pcm_pos = 0;
        self.converter.reset();
        if let Source::Stream(input) = &self.source {
            input.clear();
        }
    }
}
