//! # Sample Format Converter
//!
//! Converts symphonia's decoded buffers into interleaved `i16`.

use crate::traits::StreamFormat;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};

/// Converts planar buffers of any sample type to interleaved signed 16-bit
/// samples.
///
/// Symphonia decodes into planar buffers whose sample type depends on the
/// codec (i16, i24, i32, f32, f64). The scratch buffer is reused across
/// packets and only reallocated when the signal layout changes or a larger
/// packet arrives.
#[derive(Default)]
pub struct SampleConverter {
    scratch: Option<(SignalSpec, usize, SampleBuffer<i16>)>,
}

impl SampleConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the frames of `decoded` to `out`, interleaved.
    ///
    /// Returns the layout of the appended frames.
    pub fn append_interleaved(&mut self, decoded: AudioBufferRef<'_>, out: &mut Vec<i16>) -> StreamFormat {
        let spec = *decoded.spec();
        let frames = decoded.capacity();

        let reusable = matches!(
            &self.scratch,
            Some((cached, capacity, _)) if *cached == spec && *capacity >= frames
        );
        if !reusable {
            self.scratch = Some((spec, frames, SampleBuffer::new(frames as u64, spec)));
        }

        if let Some((_, _, buffer)) = self.scratch.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            out.extend_from_slice(buffer.samples());
        }

        StreamFormat::new(spec.rate, spec.channels.count() as u16)
    }

    /// Drop the scratch buffer.
    pub fn reset(&mut self) {
        self.scratch = None;
    }
}
