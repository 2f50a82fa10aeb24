//! CW keying synthesis: text to a keyed sine tone.
//!
//! Used by the test suite to seed every end-to-end scenario, and by the
//! `synth` subcommand for producing calibration recordings.
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::f32::consts::PI;

use crate::alphabet;
use crate::error::Result;

/// ITU element lengths in dit units.
const DITS_PER_DASH: f32 = 3.0;
const DITS_PER_CHAR_GAP: f32 = 3.0;
const DITS_PER_WORD_GAP: f32 = 7.0;

/// Keyed-tone amplitude before any noise is mixed in.
const TONE_AMPLITUDE: f32 = 0.8;

/// Raised-cosine key ramp, bounded below a quarter of the element.
const EDGE_SECONDS: f32 = 0.005;

/// Reverse of the Latin table, for synthesis: character to pattern.
static PATTERNS: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
  alphabet::LATIN
    .iter()
    .filter_map(|(&pattern, &ch)| {
      let mut chars = ch.chars();
      let c = chars.next()?;
      chars.next().is_none().then_some((c, pattern))
    })
    .collect()
});

#[derive(Debug, Clone)]
pub struct KeyingSpec {
  pub text: String,
  pub wpm: u32,
  pub frequency: f32,
  pub sample_rate: u32,
  /// Signal-to-noise ratio in dB against the tone RMS; None keys a
  /// clean tone.
  pub snr_db: Option<f32>,
  pub seed: u64,
  /// Silence bracketing the transmission on each side.
  pub pad_seconds: f32,
  /// Linear carrier drift over the keyed span, in Hz; models an
  /// unstable oscillator. 0.0 keys a steady tone.
  pub drift_hz: f32,
}

impl Default for KeyingSpec {
  fn default() -> Self {
    KeyingSpec {
      text: String::new(),
      wpm: 20,
      frequency: 600.0,
      sample_rate: 8000,
      snr_db: None,
      seed: 7,
      pad_seconds: 0.2,
      drift_hz: 0.0,
    }
  }
}

impl KeyingSpec {
  /// Builds a spec whose silence padding puts the keyed-on fraction of
  /// the recording at `duty`.
  ///
  /// Percentile thresholding assumes CW is off most of the time: the
  /// pulse percentile must land on the key ramps between the silent
  /// and keyed envelope levels. A duty around 0.15 suits the default
  /// thresholds; around 0.2 suits the fast search grid.
  pub fn padded_to_duty(text: &str, wpm: u32, duty: f32) -> KeyingSpec {
    let spec = KeyingSpec { text: text.to_string(), wpm, ..KeyingSpec::default() };
    let elements = element_timeline(&spec.text, wpm);
    let on_time: f32 = elements.iter().filter(|e| e.on).map(|e| e.duration).sum();
    let keyed_time: f32 = elements.iter().map(|e| e.duration).sum();
    let pad = ((on_time / duty.clamp(0.01, 1.0) - keyed_time) / 2.0).max(0.2);
    KeyingSpec { pad_seconds: pad, ..spec }
  }
}

/// One keyed or silent span, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
  pub on: bool,
  pub duration: f32,
}

/// Expands text into the ITU element timeline: dit, dah = 3 dits,
/// intra-letter gap 1 dit, inter-letter 3, inter-word 7. Characters
/// without a Morse pattern are skipped.
pub fn element_timeline(text: &str, wpm: u32) -> Vec<Element> {
  let dit = 1.2 / wpm.max(1) as f32;
  let mut elements: Vec<Element> = Vec::new();
  let mut pending_gap: Option<f32> = None;

  for ch in text.to_uppercase().chars() {
    if ch == ' ' {
      pending_gap = Some(dit * DITS_PER_WORD_GAP);
      continue;
    }
    let Some(pattern) = PATTERNS.get(&ch) else { continue };

    if !elements.is_empty() {
      let gap = pending_gap.take().unwrap_or(dit * DITS_PER_CHAR_GAP);
      elements.push(Element { on: false, duration: gap });
    }
    pending_gap = None;

    for (i, symbol) in pattern.chars().enumerate() {
      if i > 0 {
        elements.push(Element { on: false, duration: dit });
      }
      let duration = if symbol == '-' { dit * DITS_PER_DASH } else { dit };
      elements.push(Element { on: true, duration });
    }
  }
  elements
}

/// Renders the keyed tone for `spec`, with raised-cosine key edges,
/// phase-continuous (and optionally drifting) carrier, optional seeded
/// white noise at the requested SNR, and silence padding on both
/// sides.
pub fn synthesize(spec: &KeyingSpec) -> Vec<f32> {
  let rate = spec.sample_rate as f32;
  let pad = (spec.pad_seconds * rate) as usize;
  let elements = element_timeline(&spec.text, spec.wpm);

  let keyed: usize = elements.iter().map(|e| (e.duration * rate) as usize).sum();
  let keyed_seconds: f32 = elements.iter().map(|e| e.duration).sum();
  let mut samples = vec![0.0f32; pad];
  samples.reserve(keyed + pad);

  let mut phase = 0.0f32;
  let mut t_tx = 0.0f32;
  for element in &elements {
    let n = (element.duration * rate) as usize;
    if element.on {
      let ramp = ((EDGE_SECONDS * rate) as usize).min(n / 4).max(1);
      for i in 0..n {
        let gain = if i < ramp {
          0.5 * (1.0 - (PI * i as f32 / ramp as f32).cos())
        } else if i >= n - ramp {
          0.5 * (1.0 + (PI * (i - (n - ramp)) as f32 / ramp as f32).cos())
        } else {
          1.0
        };
        let instantaneous = if keyed_seconds > 0.0 {
          spec.frequency + spec.drift_hz * ((t_tx + i as f32 / rate) / keyed_seconds)
        } else {
          spec.frequency
        };
        phase = (phase + 2.0 * PI * instantaneous / rate).rem_euclid(2.0 * PI);
        samples.push(TONE_AMPLITUDE * gain * phase.sin());
      }
    } else {
      // the oscillator keeps running through key-up
      let midpoint = if keyed_seconds > 0.0 {
        spec.frequency + spec.drift_hz * ((t_tx + n as f32 / rate / 2.0) / keyed_seconds)
      } else {
        spec.frequency
      };
      phase = (phase + 2.0 * PI * midpoint * n as f32 / rate).rem_euclid(2.0 * PI);
      samples.extend(std::iter::repeat(0.0).take(n));
    }
    t_tx += n as f32 / rate;
  }
  samples.extend(std::iter::repeat(0.0).take(pad));

  if let Some(snr_db) = spec.snr_db {
    let tone_rms = TONE_AMPLITUDE / 2.0_f32.sqrt();
    let noise_rms = tone_rms / 10.0_f32.powf(snr_db / 20.0);
    let noise_amp = noise_rms * 3.0_f32.sqrt();
    let mut rng = StdRng::seed_from_u64(spec.seed);
    for s in &mut samples {
      *s += rng.gen_range(-noise_amp..noise_amp);
    }
  }
  samples
}

/// Writes a mono float WAV, the format the loader reads back natively.
pub fn write_wav(path: &str, sample_rate: u32, samples: &[f32]) -> Result<()> {
  let spec = hound::WavSpec {
    channels: 1,
    sample_rate,
    bits_per_sample: 32,
    sample_format: hound::SampleFormat::Float,
  };
  let mut writer = hound::WavWriter::create(path, spec)?;
  for &sample in samples {
    writer.write_sample(sample)?;
  }
  writer.finalize()?;
  Ok(())
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_timeline_for_single_letter() {
    // A = .-  ->  dit, gap, dah
    let elements = element_timeline("A", 20);
    let dit = 1.2 / 20.0;
    assert_eq!(
      elements,
      vec![
        Element { on: true, duration: dit },
        Element { on: false, duration: dit },
        Element { on: true, duration: dit * 3.0 },
      ]
    );
  }

  #[test]
  fn test_word_gap_is_seven_dits() {
    let elements = element_timeline("E E", 20);
    let dit = 1.2 / 20.0;
    assert_eq!(elements.len(), 3);
    assert_eq!(elements[1], Element { on: false, duration: dit * 7.0 });
  }

  #[test]
  fn test_unknown_characters_are_skipped() {
    assert_eq!(element_timeline("E#E", 20).len(), 3);
    assert!(element_timeline("#", 20).is_empty());
  }

  #[test]
  fn test_synthesis_is_seed_deterministic() {
    let spec = KeyingSpec { text: "SOS".to_string(), snr_db: Some(15.0), ..KeyingSpec::default() };
    assert_eq!(synthesize(&spec), synthesize(&spec));
  }

  #[test]
  fn test_duty_padding() {
    let spec = KeyingSpec::padded_to_duty("PARIS PARIS", 20, 0.15);
    let samples = synthesize(&spec);
    let on = samples.iter().filter(|s| s.abs() > 0.1).count();
    let duty = on as f32 / samples.len() as f32;
    assert!(duty > 0.10 && duty < 0.20, "duty was {}", duty);
  }

  #[test]
  fn test_clean_tone_peak_is_bounded() {
    let spec = KeyingSpec { text: "PARIS".to_string(), ..KeyingSpec::default() };
    let samples = synthesize(&spec);
    let peak = crate::stats::peak_abs(&samples);
    assert!(peak <= TONE_AMPLITUDE + 1e-3);
    assert!(peak > 0.5);
  }
}
