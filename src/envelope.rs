//! Analytic-signal envelope extraction with median smoothing.
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{FftDirection, FftPlanner};

/// Smoothing window as a fraction of the sample rate (~10 ms). Keyed
/// transients shorter than this are suppressed without rounding pulse
/// edges the way a moving average would.
const SMOOTHING_WINDOW_SECONDS: f32 = 0.01;

/// Computes the envelope of `samples`: magnitude of the analytic signal
/// (Hilbert transform via FFT), then a median filter with an odd window
/// of about `0.01 * rate` samples.
pub fn detect_envelope(samples: &[f32], sample_rate: u32) -> Vec<f32> {
  if samples.is_empty() {
    return Vec::new();
  }
  let magnitude = analytic_magnitude(samples);

  let mut window = (sample_rate as f32 * SMOOTHING_WINDOW_SECONDS) as usize;
  if window % 2 == 0 {
    window += 1;
  }
  median_filter(&magnitude, window)
}

/// |analytic signal| by the FFT method: zero the negative-frequency
/// bins, double the positive ones, inverse transform.
fn analytic_magnitude(samples: &[f32]) -> Vec<f32> {
  let n = samples.len();
  let mut planner = FftPlanner::new();
  let fft = planner.plan_fft(n, FftDirection::Forward);
  let ifft = planner.plan_fft(n, FftDirection::Inverse);

  let mut spectrum: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
  let mut scratch = vec![Complex::zero(); fft.get_inplace_scratch_len()];
  fft.process_with_scratch(&mut spectrum, &mut scratch);

  let half = n / 2;
  for (i, bin) in spectrum.iter_mut().enumerate() {
    if i == 0 || (n % 2 == 0 && i == half) {
      // DC and Nyquist stay as-is
    } else if i <= half {
      *bin = *bin * 2.0;
    } else {
      *bin = Complex::zero();
    }
  }

  let mut scratch = vec![Complex::zero(); ifft.get_inplace_scratch_len()];
  ifft.process_with_scratch(&mut spectrum, &mut scratch);

  // rustfft leaves the inverse unnormalised
  let scale = 1.0 / n as f32;
  spectrum.iter().map(|c| (c * scale).norm()).collect()
}

/// Median filter with zero-padded edges and an odd window length.
fn median_filter(values: &[f32], window: usize) -> Vec<f32> {
  if window <= 1 || values.len() < 2 {
    return values.to_vec();
  }
  let half = window / 2;
  let mut out = Vec::with_capacity(values.len());
  let mut scratch: Vec<f32> = Vec::with_capacity(window);

  for i in 0..values.len() {
    scratch.clear();
    for j in 0..window {
      let idx = i as isize + j as isize - half as isize;
      if idx < 0 || idx >= values.len() as isize {
        scratch.push(0.0);
      } else {
        scratch.push(values[idx as usize]);
      }
    }
    let mid = scratch.len() / 2;
    scratch.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out.push(scratch[mid]);
  }
  out
}

#[cfg(test)]
mod test {
  use super::*;
  use std::f32::consts::PI;

  const RATE: u32 = 8000;

  #[test]
  fn test_envelope_tracks_keyed_tone() {
    // 100 ms on, 100 ms off, 100 ms on
    let seg = (RATE / 10) as usize;
    let mut samples = Vec::new();
    for block in 0..3 {
      for i in 0..seg {
        let t = (block * seg + i) as f32 / RATE as f32;
        let on = block != 1;
        samples.push(if on { (2.0 * PI * 600.0 * t).sin() } else { 0.0 });
      }
    }
    let env = detect_envelope(&samples, RATE);
    assert_eq!(env.len(), samples.len());
    assert!(env.iter().all(|&e| e >= 0.0));

    // centre of each region, away from transitions
    let on_level = env[seg / 2];
    let off_level = env[seg + seg / 2];
    assert!(on_level > 0.7, "on level was {}", on_level);
    assert!(off_level < 0.2, "off level was {}", off_level);
  }

  #[test]
  fn test_short_transient_is_suppressed() {
    let mut samples = vec![0.0f32; 4000];
    samples[2000] = 1.0; // single-sample click
    let env = detect_envelope(&samples, RATE);
    let peak = crate::stats::peak_abs(&env);
    assert!(peak < 0.5, "click survived smoothing: {}", peak);
  }

  #[test]
  fn test_empty_input() {
    assert!(detect_envelope(&[], RATE).is_empty());
  }

  #[test]
  fn test_median_filter_rejects_isolated_spike() {
    let values = vec![0.0, 0.0, 10.0, 0.0, 0.0];
    let filtered = median_filter(&values, 3);
    assert_eq!(filtered, vec![0.0, 0.0, 0.0, 0.0, 0.0]);
  }
}
