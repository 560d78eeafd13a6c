//! Headerless PCM backend.

use crate::error::{PlaybackError, Result};
use crate::metadata::MetaKey;
use crate::traits::{DecodeOutput, DecodeStatus, Decoder, StreamFormat, TagUpdate};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tracing::debug;

/// Decoder for signed 16-bit little-endian interleaved PCM.
///
/// The stream carries no header, so the rate and channel count are supplied up
/// front. A sample split across two `feed` calls is carried over. The playing
/// time is derived from the size declared through
/// [`set_total_size`](Decoder::set_total_size).
#[derive(Debug)]
pub struct RawPcmDecoder {
    format: StreamFormat,
    pending: BytesMut,
    opened: bool,
    input_ended: bool,
    total_size: Option<u64>,
    tag_revision: u64,
    published_revision: u64,
}

impl RawPcmDecoder {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            pending: BytesMut::new(),
            opened: false,
            input_ended: false,
            total_size: None,
            tag_revision: 0,
            published_revision: 0,
        }
    }

    /// Declared total size, if any.
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Bytes fed but not yet decoded.
    pub fn buffered_bytes(&self) -> usize {
        self.pending.len()
    }

    fn frame_bytes(&self) -> usize {
        usize::from(self.format.channels) * 2
    }

    fn bytes_per_second(&self) -> u64 {
        u64::from(self.format.sample_rate) * self.frame_bytes() as u64
    }
}

impl Decoder for RawPcmDecoder {
    fn name(&self) -> &str {
        "pcm"
    }

    fn open(&mut self) -> Result<()> {
        if self.format.sample_rate == 0 || self.format.channels == 0 {
            return Err(PlaybackError::OpenFailure(format!(
                "invalid PCM layout: {} Hz, {} channels",
                self.format.sample_rate, self.format.channels
            )));
        }
        self.opened = true;
        self.tag_revision += 1;
        debug!(
            sample_rate = self.format.sample_rate,
            channels = self.format.channels,
            "PCM decoder opened"
        );
        Ok(())
    }

    fn set_total_size(&mut self, bytes: u64) -> bool {
        self.total_size = Some(bytes);
        self.tag_revision += 1;
        true
    }

    fn feed(&mut self, payload: &[u8]) -> Result<()> {
        if !self.opened {
            return Err(PlaybackError::NotOpened);
        }
        self.pending.extend_from_slice(payload);
        Ok(())
    }

    fn end_of_input(&mut self) {
        self.input_ended = true;
    }

    fn read(&mut self, out: &mut [i16]) -> Result<DecodeOutput> {
        if !self.opened {
            return Err(PlaybackError::NotOpened);
        }

        let channels = usize::from(self.format.channels);
        let frames = (out.len() / channels).min(self.pending.len() / self.frame_bytes());

        if frames == 0 {
            let status = if self.input_ended {
                DecodeStatus::EndOfStream
            } else {
                DecodeStatus::NeedMoreInput
            };
            return Ok(DecodeOutput::new(0, status));
        }

        for sample in out[..frames * channels].iter_mut() {
            *sample = self.pending.get_i16_le();
        }

        Ok(DecodeOutput::new(frames, DecodeStatus::Ok))
    }

    fn format(&self) -> Option<StreamFormat> {
        Some(self.format)
    }

    fn length(&self) -> Option<Duration> {
        let bytes_per_second = self.bytes_per_second();
        if bytes_per_second == 0 {
            return None;
        }
        self.total_size
            .map(|size| Duration::from_secs_f64(size as f64 / bytes_per_second as f64))
    }

    fn poll_tags(&mut self) -> Option<TagUpdate> {
        if !self.opened || self.tag_revision == self.published_revision {
            return None;
        }
        self.published_revision = self.tag_revision;

        let mut update = TagUpdate::new(self.tag_revision)
            .with(MetaKey::Format, "PCM")
            .with(MetaKey::Channels, self.format.channels);
        if let Some(length) = self.length() {
            update = update.with(MetaKey::Length, length.as_secs() as i64);
        }
        Some(update)
    }

    fn close(&mut self) {
        self.pending.clear();
        self.opened = false;
    }
}
