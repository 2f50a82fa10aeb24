//! Signal analytics: modulation type, purity metrics, operator skill.
use serde::Serialize;

use crate::segment::Pulse;
use crate::spectrum::{self, Spectrum};
use crate::stats;

/// Upper frequency bound for spectral scans; CW audio sits well below.
const SCAN_MAX_HZ: f32 = 3000.0;

/// Minimum separation between spectral peaks, in Hz.
const PEAK_SEPARATION_HZ: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModulationType {
  Cw,
  Psk31,
  Rtty,
}

#[derive(Debug, Clone, Serialize)]
pub struct Modulation {
  pub modulation_type: ModulationType,
  pub confidence: u32,
  pub dominant_frequency: f32,
  pub bandwidth: f32,
  pub num_peaks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Purity {
  /// Frequency drift across 500 ms segments, 0-100
  pub chirp: f32,
  /// Count of abrupt envelope jumps
  pub clicks: usize,
  /// Noise severity from the envelope SNR estimate, 0-100
  pub noise_level: f32,
  /// Envelope-based SNR estimate in dB, clamped to [0, 40]
  pub snr_estimate: f32,
  /// More than three significant spectral peaks
  pub qrm_detected: bool,
  /// Composite cleanliness, 0-100
  pub purity_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkillTier {
  Expert,
  Advanced,
  Intermediate,
  Beginner,
  Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorSkill {
  pub timing_stability: f32,
  pub rhythm_consistency: f32,
  pub dot_dash_ratio: f32,
  pub variance_score: f32,
  pub skill_level: SkillTier,
  pub skill_score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalAnalysis {
  pub modulation: Modulation,
  pub purity: Purity,
  pub operator_skill: OperatorSkill,
}

/// Runs all three analyses over one decoded recording.
pub fn analyze(
  filtered: &[f32], envelope: &[f32], pulses: &[Pulse], gaps: &[f32], sample_rate: u32,
) -> SignalAnalysis {
  SignalAnalysis {
    modulation: detect_modulation(filtered, sample_rate),
    purity: analyze_purity(filtered, envelope, sample_rate),
    operator_skill: analyze_operator_skill(pulses, gaps),
  }
}

/// Classifies the transmission mode from the spectrum shape: RTTY has
/// two peaks at a mark/space shift, PSK31 a very narrow band, CW one
/// dominant tone.
pub fn detect_modulation(audio: &[f32], sample_rate: u32) -> Modulation {
  let spec = spectrum::magnitude_spectrum(audio, sample_rate);
  let peak_mag = spec.peak_magnitude();

  let dominant_frequency = spec.dominant_bin().map(|i| spec.freqs[i]).unwrap_or(0.0);

  // spread of frequencies still above a tenth of the peak
  let significant: Vec<f32> = spec
    .freqs
    .iter()
    .zip(spec.magnitude.iter())
    .filter(|(_, &m)| m > peak_mag * 0.1)
    .map(|(&f, _)| f)
    .collect();
  let bandwidth = match (significant.first(), significant.last()) {
    (Some(lo), Some(hi)) => hi - lo,
    _ => 0.0,
  };

  let distance_bins = bins_for_hz(&spec, PEAK_SEPARATION_HZ);
  let peaks = spectrum::find_peaks(&spec.magnitude, peak_mag * 0.3, distance_bins);
  let num_peaks = peaks.len();

  if num_peaks >= 2 {
    let peak_freqs: Vec<f32> = peaks.iter().map(|&p| spec.freqs[p]).collect();
    let rtty_shift = peak_freqs
      .windows(2)
      .map(|w| w[1] - w[0])
      .any(|d| (150.0 < d && d < 200.0) || (400.0 < d && d < 500.0));
    if rtty_shift {
      return Modulation {
        modulation_type: ModulationType::Rtty,
        confidence: 70,
        dominant_frequency,
        bandwidth,
        num_peaks,
      };
    }
  } else if 20.0 < bandwidth && bandwidth < 60.0 {
    return Modulation {
      modulation_type: ModulationType::Psk31,
      confidence: 60,
      dominant_frequency,
      bandwidth,
      num_peaks,
    };
  }

  Modulation {
    modulation_type: ModulationType::Cw,
    confidence: 80,
    dominant_frequency,
    bandwidth,
    num_peaks,
  }
}

/// Purity metrics over the filtered signal and its envelope.
pub fn analyze_purity(audio: &[f32], envelope: &[f32], sample_rate: u32) -> Purity {
  let chirp = frequency_drift(audio, sample_rate);
  let clicks = count_clicks(envelope);
  let noise_level = noise_level(envelope);
  let snr_estimate = estimate_snr(envelope);
  let qrm_detected = detect_qrm(audio, sample_rate);

  let purity_score =
    (100.0 - chirp * 0.3 - (clicks as f32 * 5.0).min(30.0) - noise_level * 0.5).clamp(0.0, 100.0);

  Purity { chirp, clicks, noise_level, snr_estimate, qrm_detected, purity_score }
}

/// Keying-statistics profile of the operator. Fewer than 10 pulses is
/// not enough signal to judge.
pub fn analyze_operator_skill(pulses: &[Pulse], gaps: &[f32]) -> OperatorSkill {
  if pulses.len() < 10 {
    return OperatorSkill {
      timing_stability: 0.0,
      rhythm_consistency: 0.0,
      dot_dash_ratio: 0.0,
      variance_score: 0.0,
      skill_level: SkillTier::Unknown,
      skill_score: 0.0,
    };
  }

  let durations: Vec<f32> = pulses.iter().map(|p| p.duration).collect();
  let (dots, dashes) = split_duration_classes(&durations);

  // Variation is judged within each element class. A mixed dit/dah
  // population has an irreducible CV near 0.5, which would grade
  // textbook keying as a beginner.
  let timing_stability = (100.0 - class_cv(&[&dots, &dashes]) * 200.0).max(0.0);

  let rhythm_consistency = if gaps.len() < 5 {
    50.0
  } else {
    (100.0 - class_cv(&gap_classes(gaps)) * 150.0).max(0.0)
  };

  let dot_dash_ratio = dot_dash_ratio(&dots, &dashes);

  let variance_score = {
    let normalised = [&dots, &dashes]
      .iter()
      .filter(|c| !c.is_empty())
      .map(|c| {
        let mean = stats::mean(c);
        if mean == 0.0 {
          1.0
        } else {
          stats::variance(c) / (mean * mean)
        }
      })
      .fold(0.0f32, f32::max);
    (100.0 - normalised * 500.0).max(0.0)
  };

  let skill_score = (timing_stability + rhythm_consistency + variance_score) / 3.0;
  let skill_level = if skill_score >= 80.0 {
    SkillTier::Expert
  } else if skill_score >= 60.0 {
    SkillTier::Advanced
  } else if skill_score >= 40.0 {
    SkillTier::Intermediate
  } else {
    SkillTier::Beginner
  };

  OperatorSkill {
    timing_stability,
    rhythm_consistency,
    dot_dash_ratio,
    variance_score,
    skill_level,
    skill_score,
  }
}

/// Splits pulse durations into the dot and dash clusters at the
/// midpoint between the extremes. A unimodal population (everything
/// within a factor of two) is all dots.
fn split_duration_classes(durations: &[f32]) -> (Vec<f32>, Vec<f32>) {
  let min = durations.iter().cloned().fold(f32::INFINITY, f32::min);
  let max = durations.iter().cloned().fold(0.0, f32::max);
  if max <= 2.0 * min {
    return (durations.to_vec(), Vec::new());
  }
  let midpoint = (min + max) / 2.0;
  let dots = durations.iter().cloned().filter(|&d| d < midpoint).collect();
  let dashes = durations.iter().cloned().filter(|&d| d >= midpoint).collect();
  (dots, dashes)
}

/// Buckets gaps into the intra-letter / inter-letter / inter-word
/// populations (nominal 1:3:7) anchored on the shortest gap.
fn gap_classes(gaps: &[f32]) -> Vec<Vec<f32>> {
  let unit = gaps.iter().cloned().filter(|&g| g > 0.0).fold(f32::INFINITY, f32::min);
  if !unit.is_finite() {
    return vec![gaps.to_vec()];
  }
  let mut classes = vec![Vec::new(), Vec::new(), Vec::new()];
  for &g in gaps {
    if g < unit * 2.0 {
      classes[0].push(g);
    } else if g < unit * 5.0 {
      classes[1].push(g);
    } else {
      classes[2].push(g);
    }
  }
  classes
}

/// Count-weighted mean coefficient of variation across classes,
/// ignoring the empty ones.
fn class_cv<C: AsRef<[f32]>>(classes: &[C]) -> f32 {
  let mut weighted = 0.0;
  let mut total = 0usize;
  for class in classes {
    let class = class.as_ref();
    if class.is_empty() {
      continue;
    }
    weighted += stats::coefficient_of_variation(class) * class.len() as f32;
    total += class.len();
  }
  if total == 0 {
    return 0.0;
  }
  weighted / total as f32
}

/// Mean dash length over mean dot length; 3.0 for textbook keying.
fn dot_dash_ratio(dots: &[f32], dashes: &[f32]) -> f32 {
  if dots.is_empty() || dashes.is_empty() {
    return 0.0;
  }
  let avg_dot = stats::mean(dots);
  if avg_dot == 0.0 {
    return 0.0;
  }
  stats::mean(dashes) / avg_dot
}

/// Chirp as the spread of per-segment peak frequencies over 500 ms
/// windows, 10 Hz of drift per point.
fn frequency_drift(audio: &[f32], sample_rate: u32) -> f32 {
  let segment_length = (0.5 * sample_rate as f32) as usize;
  if segment_length == 0 {
    return 0.0;
  }
  let num_segments = audio.len() / segment_length;
  if num_segments < 2 {
    return 0.0;
  }

  let mut peak_freqs: Vec<f32> = Vec::with_capacity(num_segments);
  for i in 0..num_segments {
    let segment = &audio[i * segment_length..(i + 1) * segment_length];
    let spec = spectrum::magnitude_spectrum(segment, sample_rate).band(0.0, SCAN_MAX_HZ);
    if let Some(bin) = spec.dominant_bin() {
      peak_freqs.push(spec.freqs[bin]);
    }
  }
  if peak_freqs.len() < 2 {
    return 0.0;
  }

  let lo = peak_freqs.iter().cloned().fold(f32::INFINITY, f32::min);
  let hi = peak_freqs.iter().cloned().fold(0.0, f32::max);
  ((hi - lo) / 10.0).min(100.0)
}

/// Keyed edges smeared through the median window never move the
/// envelope by more than a few percent of its peak per sample; a real
/// key click survives smoothing as a near-full-scale jump. Diffs below
/// this fraction of the peak are keying, not clicks.
const CLICK_FLOOR: f32 = 0.1;

/// Abrupt envelope jumps: first-difference samples beyond three
/// standard deviations, with an absolute floor so ordinary key-edge
/// slopes (which dominate the diff statistics of any keyed signal)
/// are not themselves counted.
fn count_clicks(envelope: &[f32]) -> usize {
  if envelope.len() < 2 {
    return 0;
  }
  let peak = envelope.iter().cloned().fold(0.0, f32::max);
  let diff: Vec<f32> = envelope.windows(2).map(|w| w[1] - w[0]).collect();
  let threshold = (stats::std_dev(&diff) * 3.0).max(peak * CLICK_FLOOR);
  if threshold == 0.0 {
    return 0;
  }
  diff.iter().filter(|d| d.abs() > threshold).count()
}

/// Noise severity on a 0-100 scale, from the envelope SNR estimate:
/// `100 - 2.5 * snr_db`, so a clean 40 dB recording reads 0 and a
/// signal drowning at 0 dB reads 100.
///
/// The floor-over-peak ratio (`100 * p10(env) / max(env)`) reads only
/// ~10 for a recording with a 10 dB noise floor, grading heavy noise
/// as a five-point defect; this scaling makes the purity score track
/// how noisy the channel actually is.
fn noise_level(envelope: &[f32]) -> f32 {
  let signal_peak = envelope.iter().cloned().fold(0.0, f32::max);
  if signal_peak == 0.0 {
    return 100.0;
  }
  (100.0 - 2.5 * estimate_snr(envelope)).clamp(0.0, 100.0)
}

/// SNR in dB from envelope power above the median versus below the
/// lower quartile, clamped to [0, 40].
fn estimate_snr(envelope: &[f32]) -> f32 {
  let p50 = stats::percentile(envelope, 50.0);
  let p25 = stats::percentile(envelope, 25.0);

  let signal: Vec<f32> = envelope.iter().cloned().filter(|&e| e > p50).map(|e| e * e).collect();
  let noise: Vec<f32> = envelope.iter().cloned().filter(|&e| e < p25).map(|e| e * e).collect();

  let signal_power = stats::mean(&signal);
  let noise_power = stats::mean(&noise);
  if noise_power == 0.0 {
    return 40.0;
  }
  (10.0 * (signal_power / noise_power).log10()).clamp(0.0, 40.0)
}

/// QRM: more than three spectral peaks above 20% of the maximum.
fn detect_qrm(audio: &[f32], sample_rate: u32) -> bool {
  let spec = spectrum::magnitude_spectrum(audio, sample_rate).band(0.0, SCAN_MAX_HZ);
  let peak_mag = spec.peak_magnitude();
  if peak_mag == 0.0 {
    return false;
  }
  let distance_bins = bins_for_hz(&spec, PEAK_SEPARATION_HZ);
  let peaks = spectrum::find_peaks(&spec.magnitude, peak_mag * 0.2, distance_bins);
  peaks.len() > 3
}

fn bins_for_hz(spec: &Spectrum, hz: f32) -> usize {
  let resolution = spec.resolution();
  if resolution <= 0.0 {
    return 1;
  }
  ((hz / resolution) as usize).max(1)
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
  fn test_pure_tone_is_cw() {
    let result = detect_modulation(&tone(600.0, 16000), RATE);
    assert_eq!(result.modulation_type, ModulationType::Cw);
    assert_eq!(result.confidence, 80);
    assert!((result.dominant_frequency - 600.0).abs() < 2.0);
  }

  #[test]
  fn test_mark_space_pair_is_rtty() {
    let samples: Vec<f32> =
      tone(600.0, 16000).iter().zip(tone(770.0, 16000)).map(|(a, b)| a + b).collect();
    let result = detect_modulation(&samples, RATE);
    assert_eq!(result.modulation_type, ModulationType::Rtty);
    assert_eq!(result.num_peaks, 2);
  }

  #[test]
  fn test_narrowband_am_is_psk31() {
    // 20 Hz amplitude modulation spreads ±20 Hz sidebands around the
    // carrier, a ~40 Hz wide line
    let samples: Vec<f32> = (0..32000)
      .map(|i| {
        let t = i as f32 / RATE as f32;
        (1.0 + 0.8 * (2.0 * PI * 20.0 * t).sin()) * (2.0 * PI * 600.0 * t).sin() * 0.5
      })
      .collect();
    let result = detect_modulation(&samples, RATE);
    assert_eq!(result.modulation_type, ModulationType::Psk31);
  }

  #[test]
  fn test_skill_requires_ten_pulses() {
    let pulses: Vec<Pulse> =
      (0..5).map(|i| Pulse { start: i as f32, end: i as f32 + 0.06, duration: 0.06 }).collect();
    let skill = analyze_operator_skill(&pulses, &[]);
    assert_eq!(skill.skill_level, SkillTier::Unknown);
    assert_eq!(skill.skill_score, 0.0);
  }

  #[test]
  fn test_textbook_keying_scores_expert() {
    // perfect dits and dahs, constant gaps
    let mut pulses = Vec::new();
    let mut t = 0.0;
    for i in 0..20 {
      let d = if i % 2 == 0 { 0.06 } else { 0.18 };
      pulses.push(Pulse { start: t, end: t + d, duration: d });
      t += d + 0.06;
    }
    let gaps = vec![0.06f32; 19];
    let skill = analyze_operator_skill(&pulses, &gaps);
    assert_eq!(skill.skill_level, SkillTier::Expert);
    assert!((skill.dot_dash_ratio - 3.0).abs() < 0.2);
    assert_eq!(skill.rhythm_consistency, 100.0);
  }

  #[test]
  fn test_noise_level_of_clean_envelope_is_low() {
    let mut env = vec![0.001f32; 1000];
    for v in &mut env[200..400] {
      *v = 1.0;
    }
    assert!(noise_level(&env) < 1.0);
    assert_eq!(noise_level(&vec![0.0; 100]), 100.0);
  }

  #[test]
  fn test_heavy_noise_floor_grades_high() {
    // a wandering floor a few dB under the signal
    let mut env: Vec<f32> = (0..600).map(|i| 0.2 + 0.2 * i as f32 / 600.0).collect();
    env.extend(std::iter::repeat(1.0).take(400));
    assert!(noise_level(&env) > 50.0, "noise level {}", noise_level(&env));
  }

  #[test]
  fn test_snr_clamps_to_40() {
    let mut env = vec![0.0f32; 100];
    for v in &mut env[60..] {
      *v = 1.0;
    }
    assert_eq!(estimate_snr(&env), 40.0);
  }

  #[test]
  fn test_flat_envelope_has_no_clicks() {
    assert_eq!(count_clicks(&vec![0.5; 500]), 0);
  }

  #[test]
  fn test_key_ramps_are_not_clicks() {
    // 40-sample raised-cosine edges, the shape clean keying leaves in
    // the envelope
    let ramp = 40;
    let mut env = vec![0.0f32; 400];
    for i in 0..ramp {
      env.push(0.5 * (1.0 - (PI * i as f32 / ramp as f32).cos()));
    }
    env.extend(std::iter::repeat(1.0).take(400));
    for i in 0..ramp {
      env.push(0.5 * (1.0 + (PI * i as f32 / ramp as f32).cos()));
    }
    env.extend(std::iter::repeat(0.0).take(400));
    assert_eq!(count_clicks(&env), 0);
  }

  #[test]
  fn test_hard_step_counts_as_click() {
    let mut env = vec![0.1f32; 1000];
    for v in &mut env[500..] {
      *v = 1.0;
    }
    assert!(count_clicks(&env) >= 1);
  }

  #[test]
  fn test_two_segment_drift() {
    let mut samples = tone(600.0, 4000);
    samples.extend(tone(900.0, 4000));
    let chirp = frequency_drift(&samples, RATE);
    assert!((chirp - 30.0).abs() < 2.0);
  }
}
