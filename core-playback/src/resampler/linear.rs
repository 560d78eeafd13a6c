//! Linear-interpolation resampler.

use super::{Resample, MAX_EXPANSION};
use crate::traits::SamplePair;

/// Resampler interpolating linearly between consecutive input pairs.
///
/// Output pairs sit at input positions `0, step, 2 * step, ...` where
/// `step = source_hz / target_hz`. The first input pair only primes the
/// interpolator, so output lags input by one pair.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    step: f64,
    /// Offset of the next output pair past `previous`, in input pairs.
    position: f64,
    previous: Option<SamplePair>,
}

impl Default for LinearResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearResampler {
    /// Smallest accepted step; keeps a single input from expanding without bound.
    const MIN_STEP: f64 = 1.0 / MAX_EXPANSION as f64;

    pub fn new() -> Self {
        Self {
            step: 1.0,
            position: 0.0,
            previous: None,
        }
    }

    fn lerp(from: i16, to: i16, t: f64) -> i16 {
        let value = f64::from(from) + (f64::from(to) - f64::from(from)) * t;
        value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }
}

impl Resample for LinearResampler {
    fn set_ratio(&mut self, ratio: f64) {
        self.step = if ratio.is_finite() {
            ratio.max(Self::MIN_STEP)
        } else {
            1.0
        };
    }

    fn ratio(&self) -> f64 {
        self.step
    }

    fn push(&mut self, input: SamplePair, output: &mut Vec<SamplePair>) {
        let Some(previous) = self.previous.replace(input) else {
            return;
        };

        while self.position < 1.0 {
            output.push(SamplePair::new(
                Self::lerp(previous.left, input.left, self.position),
                Self::lerp(previous.right, input.right, self.position),
            ));
            self.position += self.step;
        }
        self.position -= 1.0;
    }

    fn reset(&mut self) {
        self.position = 0.0;
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(resampler: &mut LinearResampler, inputs: &[i16]) -> Vec<SamplePair> {
        let mut output = Vec::new();
        for &value in inputs {
            resampler.push(SamplePair::new(value, value), &mut output);
        }
        output
    }

    #[test]
    fn test_first_pair_primes() {
        let mut resampler = LinearResampler::new();
        resampler.set_ratio(2.0);
        assert!(run(&mut resampler, &[10]).is_empty());
    }

    #[test]
    fn test_downsample_by_two_keeps_every_other_pair() {
        let mut resampler = LinearResampler::new();
        resampler.set_ratio(2.0);
        let inputs: Vec<i16> = (0..10).map(|v| v * 10).collect();
        let output = run(&mut resampler, &inputs);
        let lefts: Vec<i16> = output.iter().map(|p| p.left).collect();
        assert_eq!(lefts, vec![0, 20, 40, 60, 80]);
    }

    #[test]
    fn test_upsample_by_two_interpolates_midpoints() {
        let mut resampler = LinearResampler::new();
        resampler.set_ratio(0.5);
        let output = run(&mut resampler, &[0, 100, 200]);
        let lefts: Vec<i16> = output.iter().map(|p| p.left).collect();
        assert_eq!(lefts, vec![0, 50, 100, 150]);
    }

    #[test]
    fn test_interpolation_saturates() {
        assert_eq!(LinearResampler::lerp(i16::MAX, i16::MAX, 0.5), i16::MAX);
        assert_eq!(LinearResampler::lerp(i16::MIN, i16::MAX, 0.0), i16::MIN);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut resampler = LinearResampler::new();
        resampler.set_ratio(0.5);
        run(&mut resampler, &[0, 100]);
        resampler.reset();
        assert!(run(&mut resampler, &[500]).is_empty());
    }

    #[test]
    fn test_degenerate_ratio_is_bounded() {
        let mut resampler = LinearResampler::new();
        resampler.set_ratio(0.0);
        assert!(resampler.ratio() > 0.0);
        resampler.set_ratio(f64::NAN);
        assert_eq!(resampler.ratio(), 1.0);
    }
}
