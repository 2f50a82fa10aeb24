//! Multi-signal mode: partition the spectrum into narrow bands around
//! tone peaks and decode each band independently.
use serde::Serialize;
use tracing::{info, warn};

use crate::analyzer::{self, SignalAnalysis};
use crate::decoder::MorseDecoder;
use crate::error::Result;
use crate::loader::{self, WORKING_RATE};
use crate::segment;
use crate::spectrum;
use crate::tuner::{self, SearchMode};

/// Frequency range searched for tone peaks.
pub const SPLIT_MIN_HZ: f32 = 300.0;
pub const SPLIT_MAX_HZ: f32 = 1500.0;

/// Width of the band placed around each detected peak.
const BAND_WIDTH_HZ: f32 = 400.0;

/// Minimum separation between peaks.
const PEAK_SEPARATION_HZ: f32 = 100.0;

/// Peaks below this fraction of the strongest are ignored.
const DEFAULT_PEAK_THRESHOLD: f32 = 0.1;

/// Diagnostics from peak detection, including the single-signal
/// heuristic verdict.
#[derive(Debug, Clone, Serialize)]
pub struct PeakInfo {
  pub count: usize,
  pub frequencies: Vec<f32>,
  pub amplitudes: Vec<f32>,
  pub is_single_signal: bool,
  pub warning: Option<String>,
}

/// Decode outcome for one frequency band, ranked by `quality`.
#[derive(Debug, Clone, Serialize)]
pub struct BandResult {
  pub frequency_band: (f32, f32),
  pub center_frequency: f32,
  pub text: String,
  pub wpm: f32,
  /// Fraction of recognised (non-placeholder) characters, 0-100
  pub quality: f32,
  pub signal_strength: f32,
  pub pulses: usize,
  pub signal_analysis: Option<SignalAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiSignalReport {
  pub signals: Vec<BandResult>,
  pub peak_info: PeakInfo,
}

/// Multi-signal decoder configuration.
pub struct MultiSignalDecoder {
  pub sample_rate: u32,
  pub num_peaks: usize,
  pub analyze: bool,
}

impl Default for MultiSignalDecoder {
  fn default() -> Self {
    MultiSignalDecoder { sample_rate: WORKING_RATE, num_peaks: 3, analyze: false }
  }
}

impl MultiSignalDecoder {
  /// Locates up to `num_peaks` tone peaks and places a band around
  /// each. Always returns at least one band (the full range when no
  /// peak clears the threshold).
  pub fn detect_frequency_bands(&self, audio: &[f32]) -> (Vec<(f32, f32)>, PeakInfo) {
    let spec = spectrum::magnitude_spectrum(audio, self.sample_rate).band(SPLIT_MIN_HZ, SPLIT_MAX_HZ);
    let peak_mag = spec.peak_magnitude();
    if peak_mag == 0.0 {
      let info = PeakInfo {
        count: 0,
        frequencies: Vec::new(),
        amplitudes: Vec::new(),
        is_single_signal: true,
        warning: Some("no frequency peaks found".to_string()),
      };
      return (vec![(SPLIT_MIN_HZ, SPLIT_MAX_HZ)], info);
    }

    let normalised: Vec<f32> = spec.magnitude.iter().map(|m| m / peak_mag).collect();
    let resolution = spec.resolution();
    let distance_bins = if resolution > 0.0 {
      ((PEAK_SEPARATION_HZ / resolution) as usize).max(1)
    } else {
      1
    };
    let mut peaks = spectrum::find_peaks(&normalised, DEFAULT_PEAK_THRESHOLD, distance_bins);

    if peaks.is_empty() {
      let info = PeakInfo {
        count: 0,
        frequencies: Vec::new(),
        amplitudes: Vec::new(),
        is_single_signal: true,
        warning: Some("no frequency peaks found".to_string()),
      };
      return (vec![(SPLIT_MIN_HZ, SPLIT_MAX_HZ)], info);
    }

    // strongest first, keep the top num_peaks, then back in frequency order
    peaks.sort_by(|&a, &b| {
      normalised[b].partial_cmp(&normalised[a]).unwrap_or(std::cmp::Ordering::Equal)
    });
    peaks.truncate(self.num_peaks);
    peaks.sort_unstable();

    let frequencies: Vec<f32> = peaks.iter().map(|&p| spec.freqs[p]).collect();
    let amplitudes: Vec<f32> = peaks.iter().map(|&p| normalised[p]).collect();
    let (is_single_signal, warning) = single_signal_verdict(&frequencies, &amplitudes);

    if let Some(msg) = &warning {
      warn!("{}", msg);
    }

    let bands: Vec<(f32, f32)> = frequencies
      .iter()
      .map(|&center| {
        let lo = (center - BAND_WIDTH_HZ / 2.0).max(SPLIT_MIN_HZ);
        let hi = (center + BAND_WIDTH_HZ / 2.0).min(SPLIT_MAX_HZ);
        (lo, hi)
      })
      .collect();

    let info = PeakInfo {
      count: frequencies.len(),
      frequencies,
      amplitudes,
      is_single_signal,
      warning,
    };
    (bands, info)
  }

  /// Loads the file once, then runs a fast parameter search inside
  /// each detected band. Results are ranked by recognised-character
  /// fraction.
  pub fn decode_file(&self, path: &str) -> Result<MultiSignalReport> {
    let (audio, sample_rate) = loader::load_audio(path, self.sample_rate)?;
    Ok(self.decode_buffer(&audio, sample_rate))
  }

  pub fn decode_buffer(&self, audio: &[f32], sample_rate: u32) -> MultiSignalReport {
    let (bands, peak_info) = self.detect_frequency_bands(audio);
    let duration = audio.len() as f32 / sample_rate as f32;

    let mut signals: Vec<BandResult> = Vec::new();
    for &(lo, hi) in &bands {
      match self.decode_band(audio, sample_rate, duration, lo, hi) {
        Some(result) => {
          info!(band_lo = lo, band_hi = hi, quality = result.quality, "band decoded");
          signals.push(result);
        }
        None => {
          info!(band_lo = lo, band_hi = hi, "band yielded nothing usable");
        }
      }
    }

    signals.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(std::cmp::Ordering::Equal));
    MultiSignalReport { signals, peak_info }
  }

  fn decode_band(
    &self, audio: &[f32], sample_rate: u32, duration: f32, lo: f32, hi: f32,
  ) -> Option<BandResult> {
    let decoder = MorseDecoder::new(sample_rate, lo, hi, Default::default()).ok()?;
    let filtered = decoder.bandpass(audio);
    let env = decoder.envelope(&filtered);

    let best = tuner::tune_envelope(&env, sample_rate, duration, SearchMode::Fast)?;
    if best.result.stats.error.is_some() {
      return None;
    }
    let text = best.result.text_latin.clone();
    if text.trim().chars().count() < 3 {
      return None;
    }

    let total: usize = text.chars().filter(|&c| c != ' ').count();
    let errors = text.chars().filter(|&c| c == crate::alphabet::UNKNOWN_MARK).count();
    let quality = if total == 0 {
      0.0
    } else {
      (1.0 - errors as f32 / total as f32) * 100.0
    };

    let signal_strength = env.iter().cloned().fold(0.0, f32::max);

    let signal_analysis = if self.analyze {
      let (pulses, gaps) =
        segment::detect_pulses(&env, sample_rate, best.params.pulse_percentile);
      Some(analyzer::analyze(&filtered, &env, &pulses, &gaps, sample_rate))
    } else {
      None
    };

    Some(BandResult {
      frequency_band: (lo, hi),
      center_frequency: (lo + hi) / 2.0,
      text,
      wpm: best.result.stats.wpm,
      quality,
      signal_strength,
      pulses: best.result.stats.pulses,
      signal_analysis,
    })
  }
}

/// Heuristics for "these peaks are really one transmission":
/// harmonics, one wide carrier, or a tight cluster of spurs.
fn single_signal_verdict(frequencies: &[f32], amplitudes: &[f32]) -> (bool, Option<String>) {
  match frequencies.len() {
    0 | 1 => (true, Some("only one frequency peak found, likely a single signal".to_string())),
    2 => {
      let distance = (frequencies[1] - frequencies[0]).abs();
      if distance < 300.0 {
        return (
          true,
          Some(format!("peaks only {:.0} Hz apart, likely one signal with harmonics", distance)),
        );
      }
      let ratio = amplitudes[0].min(amplitudes[1]) / amplitudes[0].max(amplitudes[1]);
      if ratio >= 0.7 && distance < 400.0 {
        return (
          true,
          Some(format!(
            "similar amplitudes ({:.2}) at close frequencies, likely one wide signal",
            ratio
          )),
        );
      }
      (false, None)
    }
    _ => {
      let span = frequencies.last().unwrap() - frequencies.first().unwrap();
      if span < 800.0 {
        return (
          true,
          Some(format!("{} peaks within {:.0} Hz, likely one signal", frequencies.len(), span)),
        );
      }
      let mean_spacing = span / (frequencies.len() - 1) as f32;
      if mean_spacing < 400.0 {
        return (
          true,
          Some(format!("mean peak spacing {:.0} Hz, likely one signal", mean_spacing)),
        );
      }
      (false, None)
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::keying::{self, KeyingSpec};

  fn mix(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
    let len = a.len().max(b.len());
    (0..len)
      .map(|i| {
        let x = a.get(i).copied().unwrap_or(0.0);
        let y = b.get(i).copied().unwrap_or(0.0);
        (x + y) / 2.0
      })
      .collect()
  }

  fn two_tone_fixture() -> Vec<f32> {
    let mut low = KeyingSpec::padded_to_duty("CQ DE R1ABC", 20, 0.21);
    low.frequency = 500.0;
    let mut high = KeyingSpec::padded_to_duty("QRZ DE UA3DX", 20, 0.21);
    high.frequency = 900.0;
    mix(keying::synthesize(&low), keying::synthesize(&high))
  }

  #[test]
  fn test_two_tones_make_two_bands() {
    let audio = two_tone_fixture();
    let splitter = MultiSignalDecoder::default();
    let (bands, info) = splitter.detect_frequency_bands(&audio);
    assert!(bands.len() >= 2, "got {} bands", bands.len());
    assert!(!info.is_single_signal);
    assert!((info.frequencies[0] - 500.0).abs() < 20.0);
    assert!((info.frequencies[1] - 900.0).abs() < 20.0);
  }

  #[test]
  fn test_both_signals_decode() {
    let audio = two_tone_fixture();
    let splitter = MultiSignalDecoder::default();
    let report = splitter.decode_buffer(&audio, 8000);
    assert_eq!(report.signals.len(), 2);
    assert!(report.signals.iter().all(|s| s.quality >= 70.0));
    let texts: Vec<&str> = report.signals.iter().map(|s| s.text.as_str()).collect();
    assert!(texts.contains(&"CQ DE R1ABC"));
    assert!(texts.contains(&"QRZ DE UA3DX"));
  }

  #[test]
  fn test_single_tone_is_flagged() {
    let mut spec = KeyingSpec::padded_to_duty("CQ CQ CQ", 20, 0.21);
    spec.frequency = 700.0;
    let audio = keying::synthesize(&spec);
    let splitter = MultiSignalDecoder::default();
    let (_bands, info) = splitter.detect_frequency_bands(&audio);
    assert!(info.is_single_signal);
    assert!(info.warning.is_some());
  }

  #[test]
  fn test_silence_returns_full_range_band() {
    let splitter = MultiSignalDecoder::default();
    let (bands, info) = splitter.detect_frequency_bands(&vec![0.0; 8000]);
    assert_eq!(bands, vec![(SPLIT_MIN_HZ, SPLIT_MAX_HZ)]);
    assert!(info.is_single_signal);
  }

  #[test]
  fn test_band_edges_are_clipped() {
    let mut spec = KeyingSpec::padded_to_duty("EEE", 20, 0.2);
    spec.frequency = 350.0;
    let audio = keying::synthesize(&spec);
    let splitter = MultiSignalDecoder::default();
    let (bands, _info) = splitter.detect_frequency_bands(&audio);
    assert!(bands.iter().all(|&(lo, hi)| lo >= SPLIT_MIN_HZ && hi <= SPLIT_MAX_HZ));
  }
}
