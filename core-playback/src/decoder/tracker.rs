//! # Tracker Decoder
//!
//! Tracker-style backend rendering a [`TrackerModule`] description.
//!
//! A module holds one or more sub-songs numbered from `first_subsong`. Each
//! sub-song renders as a stereo square wave whose amplitude identifies it
//! ([`subsong_amplitude`]), so a host can tell which sub-song is playing.
//!
//! ## Sub-songs
//!
//! - At open the decoder publishes `songs`, `startsong` (zero-based, relative
//!   to the first sub-song) and the one-based `song`.
//! - When a sub-song ends, playback moves on to the next one and `song` is
//!   republished. After the last sub-song, or after the first one in
//!   single-sub-song mode, the decoder stops and reports end of stream.
//! - [`Decoder::seek`] takes a sub-song index relative to the first sub-song
//!   and clears the stop.

use crate::error::{PlaybackError, Result};
use crate::metadata::MetaKey;
use crate::traits::{DecodeOutput, DecodeStatus, Decoder, StreamFormat, TagUpdate};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const CHANNELS: u16 = 2;

/// Frames per half period of the rendered square wave.
pub const HALF_PERIOD_FRAMES: usize = 50;

/// Peak sample value of the sub-song at relative `index`.
pub fn subsong_amplitude(index: usize) -> i16 {
    ((index + 1) * 1000).min(i16::MAX as usize) as i16
}

/// Description of a module and its sub-songs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerModule {
    pub title: String,
    /// Replayer name, published as `format`.
    pub player: String,
    pub sample_rate: u32,
    /// Number of the first sub-song.
    #[serde(default)]
    pub first_subsong: u32,
    /// Number of the sub-song played after open.
    #[serde(default)]
    pub default_subsong: u32,
    /// Length of each sub-song in frames.
    pub subsong_frames: Vec<usize>,
    /// Stop after the first sub-song instead of playing on.
    #[serde(default)]
    pub one_subsong: bool,
}

impl TrackerModule {
    pub fn new(title: impl Into<String>, player: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            title: title.into(),
            player: player.into(),
            sample_rate,
            first_subsong: 0,
            default_subsong: 0,
            subsong_frames: Vec::new(),
            one_subsong: false,
        }
    }

    /// Append a sub-song of `frames` frames.
    pub fn with_subsong(mut self, frames: usize) -> Self {
        self.subsong_frames.push(frames);
        self
    }

    pub fn with_subsong_range(mut self, first: u32, default: u32) -> Self {
        self.first_subsong = first;
        self.default_subsong = default;
        self
    }

    pub fn playing_one_subsong(mut self) -> Self {
        self.one_subsong = true;
        self
    }

    pub fn songs(&self) -> usize {
        self.subsong_frames.len()
    }

    /// Relative index of the default sub-song.
    pub fn start_index(&self) -> usize {
        self.default_subsong.saturating_sub(self.first_subsong) as usize
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.sample_rate == 0 {
            return Err("module sample rate is zero".to_string());
        }
        if self.subsong_frames.is_empty() {
            return Err("module has no sub-songs".to_string());
        }
        if self.default_subsong < self.first_subsong || self.start_index() >= self.songs() {
            return Err(format!(
                "default sub-song {} outside {}..{}",
                self.default_subsong,
                self.first_subsong,
                self.first_subsong as usize + self.songs()
            ));
        }
        Ok(())
    }
}

/// Decoder playing the sub-songs of a [`TrackerModule`].
#[derive(Debug)]
pub struct TrackerDecoder {
    module: TrackerModule,
    opened: bool,
    current: usize,
    position: usize,
    stopped: bool,
    tag_revision: u64,
    published_revision: u64,
}

impl TrackerDecoder {
    pub fn new(module: TrackerModule) -> Self {
        Self {
            module,
            opened: false,
            current: 0,
            position: 0,
            stopped: false,
            tag_revision: 0,
            published_revision: 0,
        }
    }

    pub fn module(&self) -> &TrackerModule {
        &self.module
    }

    /// Relative index of the sub-song playing.
    pub fn current_subsong(&self) -> usize {
        self.current
    }

    /// Whether playback stopped at the end of a sub-song.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn current_frames(&self) -> usize {
        self.module.subsong_frames[self.current]
    }

    fn end_subsong(&mut self) -> DecodeStatus {
        let next = self.current + 1;
        if self.module.one_subsong || next >= self.module.songs() {
            self.stopped = true;
            info!(song = self.current + 1, "Module playback stopped");
            return DecodeStatus::EndOfStream;
        }
        self.current = next;
        self.position = 0;
        self.tag_revision += 1;
        debug!(song = next + 1, "Sub-song ended, playing next");
        DecodeStatus::Ok
    }
}

impl Decoder for TrackerDecoder {
    fn name(&self) -> &str {
        "tracker"
    }

    fn open(&mut self) -> Result<()> {
        self.module.validate().map_err(PlaybackError::OpenFailure)?;
        self.opened = true;
        self.current = self.module.start_index();
        self.position = 0;
        self.stopped = false;
        self.tag_revision += 1;
        info!(
            title = %self.module.title,
            player = %self.module.player,
            songs = self.module.songs(),
            start = self.current,
            "Module loaded"
        );
        Ok(())
    }

    fn feed(&mut self, payload: &[u8]) -> Result<()> {
        if !self.opened {
            return Err(PlaybackError::NotOpened);
        }
        debug!(bytes = payload.len(), "Module decoder ignores fed bytes");
        Ok(())
    }

    fn read(&mut self, out: &mut [i16]) -> Result<DecodeOutput> {
        if !self.opened {
            return Err(PlaybackError::NotOpened);
        }
        if self.stopped {
            return Ok(DecodeOutput::new(0, DecodeStatus::EndOfStream));
        }

        let channels = usize::from(CHANNELS);
        let remaining = self.current_frames().saturating_sub(self.position);
        let frames = (out.len() / channels).min(remaining);
        let amplitude = subsong_amplitude(self.current);

        for (offset, frame) in out[..frames * channels]
            .chunks_exact_mut(channels)
            .enumerate()
        {
            let value = if ((self.position + offset) / HALF_PERIOD_FRAMES) % 2 == 0 {
                amplitude
            } else {
                -amplitude
            };
            frame.fill(value);
        }
        self.position += frames;

        if self.position < self.current_frames() {
            return Ok(DecodeOutput::new(frames, DecodeStatus::Ok));
        }
        Ok(DecodeOutput::new(frames, self.end_subsong()))
    }

    fn format(&self) -> Option<StreamFormat> {
        Some(StreamFormat::new(self.module.sample_rate, CHANNELS))
    }

    fn length(&self) -> Option<Duration> {
        if !self.opened {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.current_frames() as f64 / f64::from(self.module.sample_rate),
        ))
    }

    fn poll_tags(&mut self) -> Option<TagUpdate> {
        if !self.opened || self.tag_revision == self.published_revision {
            return None;
        }
        self.published_revision = self.tag_revision;

        let mut update = TagUpdate::new(self.tag_revision)
            .with(MetaKey::Format, self.module.player.as_str())
            .with(MetaKey::Channels, CHANNELS)
            .with(MetaKey::Songs, self.module.songs() as i64)
            .with(MetaKey::StartSong, self.module.start_index() as i64)
            .with(MetaKey::Song, (self.current + 1) as i64);
        if !self.module.title.is_empty() {
            update = update.with(MetaKey::Title, self.module.title.as_str());
        }
        if let Some(length) = self.length() {
            update = update.with(MetaKey::Length, length.as_secs() as i64);
        }
        Some(update)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, song: u32, position: Duration) -> Result<bool> {
        if !self.opened {
            return Err(PlaybackError::NotOpened);
        }
        let index = song as usize;
        if index >= self.module.songs() {
            warn!(song, songs = self.module.songs(), "Sub-song out of range");
            return Ok(false);
        }

        let offset = (position.as_secs_f64() * f64::from(self.module.sample_rate)).round() as usize;
        self.current = index;
        self.position = offset.min(self.current_frames());
        self.stopped = false;
        self.tag_revision += 1;
        debug!(
            song,
            subsong = self.module.first_subsong as usize + index,
            frame = self.position,
            "Sub-song selected"
        );
        Ok(true)
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetaValue;

    fn module() -> TrackerModule {
        TrackerModule::new("Space Debris", "protracker", 8000)
            .with_subsong(120)
            .with_subsong(80)
            .with_subsong(40)
            .with_subsong_range(3, 4)
    }

    fn opened(module: TrackerModule) -> TrackerDecoder {
        let mut decoder = TrackerDecoder::new(module);
        decoder.open().unwrap();
        decoder
    }

    fn entry(update: &TagUpdate, key: MetaKey) -> Option<&MetaValue> {
        update.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_open_publishes_subsong_tags() {
        let mut decoder = opened(module());
        assert_eq!(decoder.current_subsong(), 1);

        let update = decoder.poll_tags().unwrap();
        assert_eq!(entry(&update, MetaKey::Songs), Some(&MetaValue::Int(3)));
        assert_eq!(entry(&update, MetaKey::StartSong), Some(&MetaValue::Int(1)));
        assert_eq!(entry(&update, MetaKey::Song), Some(&MetaValue::Int(2)));
        assert_eq!(
            entry(&update, MetaKey::Format),
            Some(&MetaValue::from("protracker"))
        );
        assert_eq!(
            entry(&update, MetaKey::Title),
            Some(&MetaValue::from("Space Debris"))
        );
        assert!(decoder.poll_tags().is_none());
    }

    #[test]
    fn test_subsong_end_advances_and_republishes() {
        let mut decoder = opened(module());
        decoder.poll_tags();

        let mut out = vec![0i16; 1024];
        let first = decoder.read(&mut out).unwrap();
        assert_eq!(first, DecodeOutput::new(80, DecodeStatus::Ok));
        assert!(out[..160].iter().all(|s| s.abs() == 2000));
        assert_eq!(decoder.current_subsong(), 2);

        let update = decoder.poll_tags().unwrap();
        assert_eq!(entry(&update, MetaKey::Song), Some(&MetaValue::Int(3)));

        let last = decoder.read(&mut out).unwrap();
        assert_eq!(last, DecodeOutput::new(40, DecodeStatus::EndOfStream));
        assert!(out[..80].iter().all(|s| s.abs() == 3000));
        assert!(decoder.is_stopped());
        assert_eq!(
            decoder.read(&mut out).unwrap(),
            DecodeOutput::new(0, DecodeStatus::EndOfStream)
        );
    }

    #[test]
    fn test_single_subsong_mode_stops_after_first() {
        let mut decoder = opened(module().playing_one_subsong());
        let mut out = vec![0i16; 1024];
        let output = decoder.read(&mut out).unwrap();
        assert_eq!(output, DecodeOutput::new(80, DecodeStatus::EndOfStream));
        assert_eq!(decoder.current_subsong(), 1);
        assert!(decoder.is_stopped());
    }

    #[test]
    fn test_square_wave_alternates() {
        let mut decoder = opened(TrackerModule::new("", "sid", 8000).with_subsong(200));
        let mut out = vec![0i16; 400];
        decoder.read(&mut out).unwrap();
        assert_eq!(out[0], 1000);
        assert_eq!(out[2 * HALF_PERIOD_FRAMES], -1000);
        assert_eq!(out[4 * HALF_PERIOD_FRAMES], 1000);
    }

    #[test]
    fn test_seek_is_relative_and_clears_stop() {
        let mut decoder = opened(module());
        let mut out = vec![0i16; 1024];
        while !decoder.is_stopped() {
            decoder.read(&mut out).unwrap();
        }
        decoder.poll_tags();

        // 5 ms into sub-song 3, the first of the module
        assert!(decoder.seek(0, Duration::from_millis(5)).unwrap());
        assert!(!decoder.is_stopped());
        let update = decoder.poll_tags().unwrap();
        assert_eq!(entry(&update, MetaKey::Song), Some(&MetaValue::Int(1)));

        let output = decoder.read(&mut out[..2 * 100]).unwrap();
        assert_eq!(output.frames, 80);
        assert_eq!(out[0].abs(), 1000);
    }

    #[test]
    fn test_seek_out_of_range() {
        let mut decoder = opened(module());
        decoder.poll_tags();
        assert!(!decoder.seek(3, Duration::ZERO).unwrap());
        assert_eq!(decoder.current_subsong(), 1);
        assert!(decoder.poll_tags().is_none());
    }

    #[test]
    fn test_invalid_modules_fail_open() {
        let empty = TrackerModule::new("", "sid", 8000);
        let bad_default = module().with_subsong_range(3, 9);
        let below_first = module().with_subsong_range(3, 1);
        let no_rate = TrackerModule::new("", "sid", 0).with_subsong(10);

        for module in [empty, bad_default, below_first, no_rate] {
            let mut decoder = TrackerDecoder::new(module);
            assert!(matches!(decoder.open(), Err(PlaybackError::OpenFailure(_))));
        }
    }

    #[test]
    fn test_module_from_json() {
        let module: TrackerModule = serde_json::from_str(
            r#"{"title":"Hybris","player":"sidplay","sample_rate":44100,"subsong_frames":[441,882]}"#,
        )
        .unwrap();
        assert_eq!(module.songs(), 2);
        assert_eq!(module.start_index(), 0);
        assert!(!module.one_subsong);
    }
}
