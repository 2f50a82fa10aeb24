//! FFT magnitude spectra and peak finding shared by the signal
//! analyzer and the multi-signal splitter.
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{FftDirection, FftPlanner};

/// Positive-frequency magnitude spectrum with per-bin frequencies.
pub struct Spectrum {
  pub freqs: Vec<f32>,
  pub magnitude: Vec<f32>,
}

impl Spectrum {
  /// Frequency resolution in Hz per bin.
  pub fn resolution(&self) -> f32 {
    if self.freqs.len() < 2 {
      return 0.0;
    }
    self.freqs[1] - self.freqs[0]
  }

  pub fn peak_magnitude(&self) -> f32 {
    self.magnitude.iter().cloned().fold(0.0, f32::max)
  }

  /// Index of the strongest bin, None for an empty spectrum.
  pub fn dominant_bin(&self) -> Option<usize> {
    self
      .magnitude
      .iter()
      .enumerate()
      .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
      .map(|(i, _)| i)
  }

  /// Restricts the spectrum to `[lo, hi]` Hz.
  pub fn band(&self, lo: f32, hi: f32) -> Spectrum {
    let mut freqs = Vec::new();
    let mut magnitude = Vec::new();
    for (i, &f) in self.freqs.iter().enumerate() {
      if f >= lo && f <= hi {
        freqs.push(f);
        magnitude.push(self.magnitude[i]);
      }
    }
    Spectrum { freqs, magnitude }
  }
}

/// Computes the positive-frequency magnitude spectrum (bin zero
/// excluded).
pub fn magnitude_spectrum(samples: &[f32], sample_rate: u32) -> Spectrum {
  let n = samples.len();
  if n == 0 {
    return Spectrum { freqs: Vec::new(), magnitude: Vec::new() };
  }

  let mut planner = FftPlanner::new();
  let fft = planner.plan_fft(n, FftDirection::Forward);
  let mut spectrum: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
  let mut scratch = vec![Complex::zero(); fft.get_inplace_scratch_len()];
  fft.process_with_scratch(&mut spectrum, &mut scratch);

  let resolution = sample_rate as f32 / n as f32;
  let half = n / 2;
  let mut freqs = Vec::with_capacity(half);
  let mut magnitude = Vec::with_capacity(half);
  for i in 1..=half.max(1).min(n - 1) {
    freqs.push(i as f32 * resolution);
    magnitude.push(spectrum[i].norm());
  }
  Spectrum { freqs, magnitude }
}

/// Local-maximum peak finding with a height floor and a minimum
/// inter-peak distance in bins. When two peaks fall within
/// `min_distance`, the taller one survives.
pub fn find_peaks(values: &[f32], min_height: f32, min_distance: usize) -> Vec<usize> {
  let mut maxima: Vec<usize> = Vec::new();
  for i in 1..values.len().saturating_sub(1) {
    if values[i] >= min_height && values[i] > values[i - 1] && values[i] >= values[i + 1] {
      maxima.push(i);
    }
  }

  // tallest first, then greedily enforce the distance constraint
  maxima.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap_or(std::cmp::Ordering::Equal));
  let mut kept: Vec<usize> = Vec::new();
  for idx in maxima {
    if kept.iter().all(|&k| idx.abs_diff(k) >= min_distance.max(1)) {
      kept.push(idx);
    }
  }
  kept.sort_unstable();
  kept
}

#[cfg(test)]
mod test {
  use super::*;
  use std::f32::consts::PI;

  const RATE: u32 = 8000;

  fn tone(freq: f32, n: usize) -> Vec<f32> {
    (0..n).map(|i| (2.0 * PI * freq * i as f32 / RATE as f32).sin()).collect()
  }

  #[test]
  fn test_dominant_bin_of_pure_tone() {
    let spec = magnitude_spectrum(&tone(600.0, 8000), RATE);
    let bin = spec.dominant_bin().unwrap();
    assert!((spec.freqs[bin] - 600.0).abs() < 2.0);
  }

  #[test]
  fn test_two_tones_two_peaks() {
    let samples: Vec<f32> =
      tone(500.0, 8000).iter().zip(tone(900.0, 8000)).map(|(a, b)| a + b).collect();
    let spec = magnitude_spectrum(&samples, RATE);
    let peaks = find_peaks(&spec.magnitude, spec.peak_magnitude() * 0.3, 100);
    assert_eq!(peaks.len(), 2);
    let freqs: Vec<f32> = peaks.iter().map(|&p| spec.freqs[p]).collect();
    assert!((freqs[0] - 500.0).abs() < 5.0);
    assert!((freqs[1] - 900.0).abs() < 5.0);
  }

  #[test]
  fn test_min_distance_keeps_the_taller_peak() {
    let mut values = vec![0.0f32; 64];
    values[10] = 1.0;
    values[14] = 0.8;
    values[40] = 0.9;
    let peaks = find_peaks(&values, 0.1, 8);
    assert_eq!(peaks, vec![10, 40]);
  }

  #[test]
  fn test_band_restriction() {
    let spec = magnitude_spectrum(&tone(600.0, 8000), RATE);
    let band = spec.band(300.0, 1500.0);
    assert!(band.freqs.first().map(|&f| f >= 300.0).unwrap_or(false));
    assert!(band.freqs.last().map(|&f| f <= 1500.0).unwrap_or(false));
  }

  #[test]
  fn test_empty_input() {
    let spec = magnitude_spectrum(&[], RATE);
    assert!(spec.freqs.is_empty());
    assert!(find_peaks(&[], 0.0, 1).is_empty());
  }
}
