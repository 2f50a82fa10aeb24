//! The decoding pipeline: load, filter, envelope, segment, classify,
//! decode, with per-instance precompiled filter coefficients.
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alphabet::{self, Language, LetterToken};
use crate::analyzer::{self, SignalAnalysis};
use crate::cache::{CacheKey, ResultCache};
use crate::classify::{self, GapPercentiles};
use crate::envelope;
use crate::error::{DecodeError, Result};
use crate::filter::BandpassFilter;
use crate::loader::{self, WORKING_RATE};
use crate::segment::{self, Pulse};

/// Default passband for CW audio tones.
pub const DEFAULT_MIN_FREQ: f32 = 400.0;
pub const DEFAULT_MAX_FREQ: f32 = 1200.0;

/// The four percentile thresholds that drive segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecoderParams {
  pub pulse_percentile: u32,
  pub gap_percentile_dot_dash: u32,
  pub gap_percentile_char: u32,
  pub gap_percentile_word: u32,
}

impl Default for DecoderParams {
  fn default() -> Self {
    DecoderParams {
      pulse_percentile: 85,
      gap_percentile_dot_dash: 62,
      gap_percentile_char: 90,
      gap_percentile_word: 92,
    }
  }
}

impl DecoderParams {
  pub fn gap_percentiles(&self) -> GapPercentiles {
    GapPercentiles {
      dot_dash: self.gap_percentile_dot_dash,
      char_gap: self.gap_percentile_char,
      word_gap: self.gap_percentile_word,
    }
  }
}

/// Timing and quality statistics attached to every decode.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodeStats {
  pub wpm: f32,
  pub pulses: usize,
  pub duration: f32,
  pub morse_code: String,
  pub error: Option<String>,
  pub signal_analysis: Option<SignalAnalysis>,
}

/// Decoded text in both language tables plus stats. A decode with no
/// pulses is still a result: empty text and `stats.error` set.
#[derive(Debug, Clone, Serialize)]
pub struct DecodeResult {
  pub text_latin: String,
  pub text_cyrillic: String,
  pub stats: DecodeStats,
}

impl DecodeResult {
  /// Fraction of unrecognised letters in the Latin text, in [0, 1];
  /// 1.0 for empty text.
  pub fn question_ratio(&self) -> f32 {
    if self.text_latin.is_empty() {
      return 1.0;
    }
    let total = self.text_latin.chars().count();
    let unknown = self.text_latin.chars().filter(|&c| c == alphabet::UNKNOWN_MARK).count();
    unknown as f32 / total as f32
  }
}

/// One decoder instance: working rate, passband and thresholds, with
/// Butterworth coefficients compiled once at construction.
pub struct MorseDecoder {
  pub sample_rate: u32,
  pub min_freq: f32,
  pub max_freq: f32,
  pub params: DecoderParams,
  filter: BandpassFilter,
}

impl MorseDecoder {
  pub fn new(sample_rate: u32, min_freq: f32, max_freq: f32, params: DecoderParams) -> Result<Self> {
    let filter = BandpassFilter::new(sample_rate, min_freq, max_freq)?;
    Ok(MorseDecoder { sample_rate, min_freq, max_freq, params, filter })
  }

  pub fn with_params(params: DecoderParams) -> Result<Self> {
    MorseDecoder::new(WORKING_RATE, DEFAULT_MIN_FREQ, DEFAULT_MAX_FREQ, params)
  }

  pub fn bandpass(&self, samples: &[f32]) -> Vec<f32> {
    self.filter.apply(samples)
  }

  pub fn envelope(&self, filtered: &[f32]) -> Vec<f32> {
    envelope::detect_envelope(filtered, self.sample_rate)
  }

  pub fn detect_pulses(&self, env: &[f32]) -> (Vec<Pulse>, Vec<f32>) {
    segment::detect_pulses(env, self.sample_rate, self.params.pulse_percentile)
  }

  pub fn classify(&self, pulses: &[Pulse], gaps: &[f32]) -> Vec<LetterToken> {
    classify::classify(pulses, gaps, self.params.gap_percentiles())
  }

  /// Runs segment -> classify -> decode against a precomputed envelope.
  /// This is the per-candidate body of the parameter search; the
  /// upstream stages run once per file.
  pub fn decode_envelope(&self, env: &[f32], duration: f32) -> DecodeResult {
    decode_envelope(env, self.sample_rate, duration, self.params)
  }

  /// Full pipeline over an in-memory mono buffer at the decoder's rate.
  pub fn process_buffer(&self, audio: &[f32], analyze: bool) -> DecodeResult {
    let duration = audio.len() as f32 / self.sample_rate as f32;
    let filtered = self.bandpass(audio);
    let env = self.envelope(&filtered);
    let mut result = self.decode_envelope(&env, duration);

    if result.stats.error.is_some() {
      warn!(duration, "no pulses found");
      return result;
    }

    if analyze {
      let (pulses, gaps) = self.detect_pulses(&env);
      result.stats.signal_analysis =
        Some(analyzer::analyze(&filtered, &env, &pulses, &gaps, self.sample_rate));
    }
    result
  }

  /// Loads and decodes a file, consulting `cache` when provided.
  ///
  /// Load errors (`Io`, `SilentInput`, `UnsupportedFormat`) abort this
  /// file only; a pulse-free decode comes back as a result with
  /// `stats.error` set, never as an error.
  pub fn process_file(&self, path: &str, analyze: bool, cache: Option<&ResultCache>) -> Result<DecodeResult> {
    let key = cache.and_then(|_| CacheKey::for_file(path, self.params, analyze));
    if let (Some(cache), Some(key)) = (cache, key.as_ref()) {
      if let Some(hit) = cache.get(key) {
        debug!(path, "cache hit");
        return Ok(hit);
      }
    }

    let (audio, _rate) = loader::load_audio(path, self.sample_rate)?;
    debug!(path, seconds = audio.len() as f32 / self.sample_rate as f32, "loaded");
    let result = self.process_buffer(&audio, analyze);

    if let (Some(cache), Some(key)) = (cache, key) {
      cache.insert(key, result.clone());
    }
    Ok(result)
  }
}

/// Segment, classify and decode a precomputed envelope: a pure
/// function of `(envelope, params)`, which is what makes the tuner's
/// parallel fan-out safe.
pub fn decode_envelope(env: &[f32], sample_rate: u32, duration: f32, params: DecoderParams) -> DecodeResult {
  let (pulses, gaps) = segment::detect_pulses(env, sample_rate, params.pulse_percentile);
  if pulses.is_empty() {
    return DecodeResult {
      text_latin: String::new(),
      text_cyrillic: String::new(),
      stats: DecodeStats {
        duration,
        error: Some(DecodeError::NoPulses.to_string()),
        ..DecodeStats::default()
      },
    };
  }

  let tokens = classify::classify(&pulses, &gaps, params.gap_percentiles());
  let text_latin = alphabet::decode_tokens(&tokens, Language::Latin);
  let text_cyrillic = alphabet::decode_tokens(&tokens, Language::Cyrillic);

  DecodeResult {
    text_latin,
    text_cyrillic,
    stats: DecodeStats {
      wpm: classify::estimate_wpm(&pulses),
      pulses: pulses.len(),
      duration,
      morse_code: alphabet::tokens_to_morse_string(&tokens),
      error: None,
      signal_analysis: None,
    },
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::keying::{self, KeyingSpec};

  fn spec(text: &str) -> KeyingSpec {
    // a duty cycle the default pulse percentile (85) segments cleanly
    KeyingSpec::padded_to_duty(text, 20, 0.155)
  }

  #[test]
  fn test_process_buffer_round_trip() {
    let audio = keying::synthesize(&spec("CQ DE K"));
    let decoder = MorseDecoder::with_params(DecoderParams::default()).unwrap();
    let result = decoder.process_buffer(&audio, false);
    assert_eq!(result.text_latin, "CQ DE K");
    assert!(result.stats.error.is_none());
    assert!(result.stats.pulses > 0);
  }

  #[test]
  fn test_decode_is_deterministic() {
    let audio = keying::synthesize(&spec("PARIS"));
    let decoder = MorseDecoder::with_params(DecoderParams::default()).unwrap();
    let a = decoder.process_buffer(&audio, false);
    let b = decoder.process_buffer(&audio, false);
    assert_eq!(a.text_latin, b.text_latin);
    assert_eq!(a.stats.morse_code, b.stats.morse_code);
  }

  #[test]
  fn test_empty_buffer_is_a_flagged_result_not_an_error() {
    let decoder = MorseDecoder::with_params(DecoderParams::default()).unwrap();
    let result = decoder.process_buffer(&[], false);
    assert!(result.text_latin.is_empty());
    assert_eq!(result.stats.wpm, 0.0);
    assert!(result.stats.error.is_some());
  }

  #[test]
  fn test_question_ratio() {
    let result = DecodeResult {
      text_latin: "A□B□".to_string(),
      text_cyrillic: String::new(),
      stats: DecodeStats::default(),
    };
    assert!((result.question_ratio() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn test_process_file_uses_cache() {
    let audio = keying::synthesize(&spec("SOS"));
    let dir = std::env::temp_dir().join("cwdec-decoder-cache");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("sos.wav");
    keying::write_wav(path.to_str().unwrap(), WORKING_RATE, &audio).unwrap();

    let decoder = MorseDecoder::with_params(DecoderParams::default()).unwrap();
    let cache = ResultCache::default();
    let first = decoder.process_file(path.to_str().unwrap(), false, Some(&cache)).unwrap();
    assert_eq!(cache.len(), 1);
    let second = decoder.process_file(path.to_str().unwrap(), false, Some(&cache)).unwrap();
    assert_eq!(first.text_latin, second.text_latin);
    assert_eq!(first.text_latin, "SOS");
  }
}
