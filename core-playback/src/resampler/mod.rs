//! # Sample Rate Conversion
//!
//! Converts decoder output at its native rate into pairs at the player's
//! target rate and buffers them for the consumer.
//!
//! When the source rate equals the target rate the converter is inactive and
//! stereo input is copied into the ring buffer verbatim. Otherwise every input
//! pair goes through a [`Resample`] implementation, which may yield zero, one
//! or several output pairs per input pair.
//!
//! ```text
//! decoder PCM (native rate) → SampleRateConverter → RingBuffer → read()
//! ```

mod linear;

pub use linear::LinearResampler;

use crate::ring_buffer::RingBuffer;
use crate::traits::SamplePair;
use tracing::{debug, warn};

/// Most output pairs a [`Resample`] implementation may emit per input pair,
/// not counting one pair of fractional carry per call sequence.
pub const MAX_EXPANSION: usize = 64;

/// Interpolation capability used by [`SampleRateConverter`].
///
/// Ratios below `1 / MAX_EXPANSION` are clamped to it.
pub trait Resample: Send {
    /// Set the conversion ratio (`source_hz / target_hz`).
    fn set_ratio(&mut self, ratio: f64);

    /// Current ratio.
    fn ratio(&self) -> f64;

    /// Convert one input pair, appending every output pair it completes in order.
    fn push(&mut self, input: SamplePair, output: &mut Vec<SamplePair>);

    /// Drop interpolation history.
    fn reset(&mut self);
}

/// Rate converter owning the output ring buffer.
pub struct SampleRateConverter<R: Resample = LinearResampler> {
    target_hz: u32,
    source_hz: u32,
    active: bool,
    resampler: R,
    ring: RingBuffer,
    scratch: Vec<SamplePair>,
}

impl SampleRateConverter<LinearResampler> {
    /// Create a pass-through converter for `target_hz` with a ring buffer of
    /// `capacity` pairs.
    pub fn new(target_hz: u32, capacity: usize) -> Self {
        Self::with_resampler(target_hz, capacity, LinearResampler::new())
    }
}

impl<R: Resample> SampleRateConverter<R> {
    pub fn with_resampler(target_hz: u32, capacity: usize, mut resampler: R) -> Self {
        resampler.set_ratio(1.0);
        Self {
            target_hz,
            source_hz: target_hz,
            active: false,
            resampler,
            ring: RingBuffer::new(capacity),
            scratch: Vec::new(),
        }
    }

    /// Set the rate of incoming pairs.
    ///
    /// A zero rate is ignored.
    pub fn set_rate(&mut self, source_hz: u32) {
        if source_hz == 0 {
            warn!("Ignoring zero source sample rate");
            return;
        }
        if source_hz == self.source_hz {
            return;
        }

        self.source_hz = source_hz;
        self.active = source_hz != self.target_hz;
        self.resampler
            .set_ratio(f64::from(source_hz) / f64::from(self.target_hz));
        debug!(
            source_hz,
            target_hz = self.target_hz,
            active = self.active,
            "Sample rate converter reconfigured"
        );
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn source_rate(&self) -> u32 {
        self.source_hz
    }

    pub fn target_rate(&self) -> u32 {
        self.target_hz
    }

    /// Convert and buffer `pairs`. Returns the number of pairs buffered.
    pub fn write(&mut self, pairs: &[SamplePair]) -> usize {
        if !self.active {
            return self.ring.write(pairs);
        }

        self.scratch.clear();
        for &pair in pairs {
            self.resampler.push(pair, &mut self.scratch);
        }
        self.ring.write(&self.scratch)
    }

    /// Convert and buffer interleaved samples with `channels` per frame.
    ///
    /// Stereo input at the target rate is bulk-copied; anything else goes
    /// through the resampler frame by frame. Trailing partial frames are
    /// ignored.
    pub fn write_interleaved(&mut self, samples: &[i16], channels: u16) -> usize {
        let channels = usize::from(channels);
        if channels == 0 {
            return 0;
        }

        if !self.active && channels == 2 {
            self.scratch.clear();
            self.scratch.extend(
                samples
                    .chunks_exact(2)
                    .map(|frame| SamplePair::new(frame[0], frame[1])),
            );
            return self.ring.write(&self.scratch);
        }

        self.scratch.clear();
        for frame in samples.chunks_exact(channels) {
            let pair = SamplePair::from_frame(frame);
            if self.active {
                self.resampler.push(pair, &mut self.scratch);
            } else {
                self.scratch.push(pair);
            }
        }
        self.ring.write(&self.scratch)
    }

    /// Drain up to `out.len()` pairs in FIFO order. Never blocks.
    pub fn read(&mut self, out: &mut [SamplePair]) -> usize {
        self.ring.read(out)
    }

    /// Largest number of input frames whose output is guaranteed to fit in
    /// the ring buffer's free space.
    pub fn input_budget(&self) -> usize {
        let free = self.ring.free_space();
        if !self.active {
            return free;
        }
        // Each input frame yields at most 1/ratio outputs, plus one for the
        // fractional carry.
        let usable = free.saturating_sub(2) as f64;
        (usable * self.resampler.ratio()).floor() as usize
    }

    /// [`input_budget`](Self::input_budget) for a source whose rate is not
    /// known yet: sized for the largest expansion any ratio can produce.
    pub fn unknown_rate_budget(&self) -> usize {
        self.ring.free_space().saturating_sub(2) / MAX_EXPANSION
    }

    pub fn available(&self) -> usize {
        self.ring.available()
    }

    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Drop buffered pairs and interpolation history.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.resampler.reset();
    }
}
