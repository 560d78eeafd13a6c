//! # Decoder Feed Adapter
//!
//! [`DecoderSession`] owns one [`Decoder`] for the lifetime of a player and
//! enforces its lifecycle: a single open, bytes only after open, end of stream
//! latched once, close exactly once.

use crate::error::{PlaybackError, Result};
use crate::metadata::{MetaKey, MetaValue, MetadataSink};
use crate::traits::{DecodeOutput, DecodeStatus, Decoder, StreamFormat};
use tracing::{debug, info, warn};

pub struct DecoderSession {
    decoder: Box<dyn Decoder>,
    opened: bool,
    closed: bool,
    bytes_fed: u64,
    stream_ended: bool,
    format: Option<StreamFormat>,
    pending_total_size: Option<u64>,
    last_tag_revision: Option<u64>,
    length_reported: bool,
}

impl DecoderSession {
    pub fn new(decoder: Box<dyn Decoder>) -> Self {
        Self {
            decoder,
            opened: false,
            closed: false,
            bytes_fed: 0,
            stream_ended: false,
            format: None,
            pending_total_size: None,
            last_tag_revision: None,
            length_reported: false,
        }
    }

    /// Open the decoder. Calls after the first successful open are no-ops.
    ///
    /// A declared total size is handed to the decoder right after it opens.
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        if self.closed {
            return Err(PlaybackError::Internal("decoder session already closed".into()));
        }

        self.decoder.open().map_err(|e| match e {
            PlaybackError::OpenFailure(_) => e,
            other => PlaybackError::OpenFailure(other.to_string()),
        })?;
        self.opened = true;

        if let Some(size) = self.pending_total_size {
            let accepted = self.decoder.set_total_size(size);
            debug!(size, accepted, "Replayed declared stream size");
        }
        if self.stream_ended {
            self.decoder.end_of_input();
        }
        self.format = valid_format(self.decoder.format());

        info!(
            decoder = self.decoder.name(),
            format = ?self.format,
            "Decoder opened"
        );
        Ok(())
    }

    /// Open and require the decoder to report its output format.
    ///
    /// Used for sources that are complete at construction (files).
    pub fn open_eager(&mut self) -> Result<StreamFormat> {
        self.open()?;
        let format = self.decoder.format().ok_or_else(|| {
            PlaybackError::FormatQueryFailure(format!(
                "{} did not report an output format",
                self.decoder.name()
            ))
        })?;
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(PlaybackError::FormatQueryFailure(format!(
                "{} reported {} Hz, {} channels",
                self.decoder.name(),
                format.sample_rate,
                format.channels
            )));
        }
        self.format = Some(format);
        Ok(format)
    }

    /// Declare the total byte length of the stream.
    ///
    /// Before open the value is kept and replayed once the decoder opens.
    pub fn set_total_size(&mut self, bytes: u64) -> bool {
        self.pending_total_size = Some(bytes);
        if self.opened {
            self.decoder.set_total_size(bytes)
        } else {
            true
        }
    }

    /// Forward payload bytes, opening the decoder first if necessary.
    pub fn feed(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        if self.stream_ended {
            warn!(bytes = payload.len(), "Payload after end of stream ignored");
            return Ok(());
        }
        self.open()?;
        self.decoder.feed(payload)?;
        self.bytes_fed += payload.len() as u64;
        Ok(())
    }

    /// Latch end of stream. No further payload is accepted.
    pub fn end_stream(&mut self) {
        if self.stream_ended {
            return;
        }
        self.stream_ended = true;
        if self.opened {
            self.decoder.end_of_input();
        }
        debug!(bytes_fed = self.bytes_fed, "End of stream signalled");
    }

    /// Pull decoded frames into `out`.
    ///
    /// Starvation is reported as [`DecodeStatus::EndOfStream`] once the stream
    /// has ended, and as [`DecodeStatus::NeedMoreInput`] before that.
    pub fn read(&mut self, out: &mut [i16]) -> Result<DecodeOutput> {
        if !self.opened {
            return Ok(self.starved());
        }

        let output = self.decoder.read(out)?;
        if let Some(format) = valid_format(self.decoder.format()) {
            self.format = Some(format);
        }
        match output.status {
            DecodeStatus::NeedMoreInput if self.stream_ended => {
                Ok(DecodeOutput::new(output.frames, DecodeStatus::EndOfStream))
            }
            _ => Ok(output),
        }
    }

    fn starved(&self) -> DecodeOutput {
        if self.stream_ended {
            DecodeOutput::new(0, DecodeStatus::EndOfStream)
        } else {
            DecodeOutput::starved()
        }
    }

    /// Copy new decoder tag data into `sink`.
    ///
    /// Each tag revision is applied once. The playing time is reported once,
    /// as soon as the decoder knows it. Returns whether anything was written.
    pub fn refresh_tags(&mut self, sink: &dyn MetadataSink) -> bool {
        if !self.opened {
            return false;
        }
        let mut written = false;

        if let Some(update) = self.decoder.poll_tags() {
            if self.last_tag_revision.map_or(true, |last| update.revision > last) {
                debug!(revision = update.revision, entries = update.entries.len(), "Applying decoder tags");
                sink.apply(&update.entries);
                self.last_tag_revision = Some(update.revision);
                written = true;
            }
        }

        if !self.length_reported {
            if let Some(length) = self.decoder.length() {
                sink.set(MetaKey::Length, MetaValue::Int(length.as_secs() as i64));
                self.length_reported = true;
                written = true;
            }
        }

        written
    }

    pub fn is_seekable(&self) -> bool {
        self.opened && self.decoder.is_seekable()
    }

    pub fn seek(&mut self, song: u32, position: std::time::Duration) -> Result<bool> {
        if !self.is_seekable() {
            return Ok(false);
        }
        self.decoder.seek(song, position)
    }

    /// Release the decoder. Runs once; later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.opened {
            self.decoder.close();
            self.opened = false;
        }
        info!(decoder = self.decoder.name(), bytes_fed = self.bytes_fed, "Decoder closed");
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stream_ended(&self) -> bool {
        self.stream_ended
    }

    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }

    /// Output format last reported by the decoder.
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn decoder_name(&self) -> &str {
        self.decoder.name()
    }
}

fn valid_format(format: Option<StreamFormat>) -> Option<StreamFormat> {
    format.filter(|f| f.sample_rate > 0 && f.channels > 0)
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        self.close();
    }
}
