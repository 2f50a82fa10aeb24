//! Zero-phase Butterworth bandpass used to isolate the keyed tone.
use biquad::{Biquad, Coefficients, DirectForm1, Hertz, Type as FilterType};
use rustfft::num_complex::Complex;

use crate::error::{DecodeError, Result};

/// 4th-order Butterworth bandpass as two staggered biquad band-pass
/// sections, applied forward-backward for zero phase.
///
/// The section centres and Qs come from the lowpass-to-bandpass
/// transform of the 2nd-order Butterworth prototype pole, so the
/// cascade has the flat Butterworth passband over `[min_freq,
/// max_freq]` rather than the pinched response two identical
/// resonators would give. The overall gain is not normalised; every
/// consumer thresholds on percentiles of the result.
///
/// Coefficients are computed once per `(rate, min_freq, max_freq)` and
/// kept on the owning decoder.
#[derive(Debug, Clone, Copy)]
pub struct BandpassFilter {
  sections: [Coefficients<f32>; 2],
}

impl BandpassFilter {
  pub fn new(sample_rate: u32, min_freq: f32, max_freq: f32) -> Result<Self> {
    let nyquist = sample_rate as f32 / 2.0;
    if min_freq <= 0.0 || max_freq <= min_freq || max_freq >= nyquist {
      return Err(DecodeError::Internal(format!(
        "invalid passband {}-{} Hz at rate {}",
        min_freq, max_freq, sample_rate
      )));
    }

    let fs = Hertz::<f32>::from_hz(sample_rate as f32)
      .map_err(|e| DecodeError::Internal(format!("bad sample rate: {:?}", e)))?;

    // Map the prototype pole p = (-1+j)/sqrt(2) through
    // s -> (s^2 + w0^2) / (B s): the two roots of
    // s^2 - pBs + w0^2 = 0 are the upper and lower section poles.
    let f0 = (min_freq as f64 * max_freq as f64).sqrt();
    let bw = (max_freq - min_freq) as f64;
    let p = Complex::new(-std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2);
    let pb = p * bw;
    let root = (pb * pb - Complex::new(4.0 * f0 * f0, 0.0)).sqrt();

    let mut sections = Vec::with_capacity(2);
    for pole in [(pb + root) / 2.0, (pb - root) / 2.0] {
      let centre = pole.norm();
      let q = centre / (2.0 * pole.re.abs());
      let coeffs = Coefficients::<f32>::from_params(
        FilterType::BandPass,
        fs,
        Hertz::<f32>::from_hz(centre as f32)
          .map_err(|e| DecodeError::Internal(format!("bad section frequency: {:?}", e)))?,
        q as f32,
      )
      .map_err(|e| {
        DecodeError::Internal(format!("failed to create bandpass coefficients: {:?}", e))
      })?;
      sections.push(coeffs);
    }

    Ok(BandpassFilter { sections: [sections[0], sections[1]] })
  }

  /// Forward-backward filtering; output has identical length and zero
  /// phase shift.
  pub fn apply(&self, samples: &[f32]) -> Vec<f32> {
    let forward = self.run_cascade(samples.iter().copied());
    let mut backward = self.run_cascade(forward.into_iter().rev());
    backward.reverse();
    backward
  }

  fn run_cascade(&self, samples: impl Iterator<Item = f32>) -> Vec<f32> {
    let mut low = DirectForm1::<f32>::new(self.sections[0]);
    let mut high = DirectForm1::<f32>::new(self.sections[1]);
    samples.map(|s| high.run(low.run(s))).collect()
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::f32::consts::PI;

  const RATE: u32 = 8000;

  fn tone(freq: f32, seconds: f32) -> Vec<f32> {
    let n = (RATE as f32 * seconds) as usize;
    (0..n).map(|i| (2.0 * PI * freq * i as f32 / RATE as f32).sin()).collect()
  }

  fn rms(xs: &[f32]) -> f32 {
    // skip the first and last quarter to avoid edge transients
    let mid = &xs[xs.len() / 4..xs.len() * 3 / 4];
    (mid.iter().map(|x| x * x).sum::<f32>() / mid.len() as f32).sqrt()
  }

  #[test]
  fn test_out_of_band_tones_are_rejected() {
    let filter = BandpassFilter::new(RATE, 400.0, 1200.0).unwrap();
    let reference = rms(&filter.apply(&tone(700.0, 1.0)));
    let low = rms(&filter.apply(&tone(60.0, 1.0)));
    let high = rms(&filter.apply(&tone(3500.0, 1.0)));
    assert!(low < 0.05 * reference, "60 Hz leaked: {} vs {}", low, reference);
    assert!(high < 0.05 * reference, "3.5 kHz leaked: {} vs {}", high, reference);
  }

  #[test]
  fn test_passband_is_flat() {
    // Butterworth response: band-edge tones sit within a few dB of the
    // centre, nothing inside the band is pinched out
    let filter = BandpassFilter::new(RATE, 400.0, 1200.0).unwrap();
    let centre = rms(&filter.apply(&tone(700.0, 1.0)));
    for freq in [450.0, 600.0, 900.0, 1100.0] {
      let level = rms(&filter.apply(&tone(freq, 1.0)));
      assert!(level > 0.4 * centre, "{} Hz attenuated to {} vs {}", freq, level, centre);
    }
  }

  #[test]
  fn test_neighbouring_tone_is_suppressed() {
    // a 900 Hz signal must not survive a 300-700 Hz band at strength
    let filter = BandpassFilter::new(RATE, 300.0, 700.0).unwrap();
    let in_band = rms(&filter.apply(&tone(500.0, 1.0)));
    let neighbour = rms(&filter.apply(&tone(900.0, 1.0)));
    assert!(neighbour < 0.25 * in_band, "neighbour leaked: {} vs {}", neighbour, in_band);
  }

  #[test]
  fn test_output_length_matches_input() {
    let filter = BandpassFilter::new(RATE, 400.0, 1200.0).unwrap();
    let input = tone(700.0, 0.5);
    assert_eq!(filter.apply(&input).len(), input.len());
  }

  #[test]
  fn test_invalid_passband_is_an_error() {
    assert!(BandpassFilter::new(RATE, 1200.0, 400.0).is_err());
    assert!(BandpassFilter::new(RATE, 400.0, 5000.0).is_err());
  }
}
