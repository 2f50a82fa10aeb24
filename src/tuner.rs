//! Grid search over segmentation thresholds, scored per candidate.
use itertools::iproduct;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::codes::{self, CodeAnalysis};
use crate::decoder::{self, DecodeResult, DecoderParams, MorseDecoder};
use crate::error::Result;
use crate::loader::{self, WORKING_RATE};
use crate::score;

/// Search breadth. `Fast` is a 12-point grid run sequentially; the
/// other modes fan out across the rayon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
  Fast,
  Thorough,
  Extreme,
}

impl std::str::FromStr for SearchMode {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "fast" => Ok(SearchMode::Fast),
      "thorough" => Ok(SearchMode::Thorough),
      "extreme" => Ok(SearchMode::Extreme),
      other => Err(format!("unknown search mode '{}' (fast, thorough, extreme)", other)),
    }
  }
}

/// One evaluated parameter tuple.
#[derive(Debug, Clone)]
pub struct Candidate {
  pub params: DecoderParams,
  pub score: f32,
  pub question_ratio: f32,
  pub result: DecodeResult,
  pub codes: CodeAnalysis,
}

/// Full cartesian product of the mode's percentile ranges.
pub fn parameter_grid(mode: SearchMode) -> Vec<DecoderParams> {
  let (pulse, dot_dash, char_gap, word_gap): (Vec<u32>, Vec<u32>, Vec<u32>, Vec<u32>) = match mode {
    SearchMode::Fast => (vec![60, 70, 80], vec![55, 60], vec![75, 85], vec![90]),
    SearchMode::Thorough => (
      vec![50, 60, 70, 75, 80, 85, 90],
      vec![50, 55, 60, 65],
      vec![70, 75, 80, 85, 90],
      vec![85, 90, 92, 94],
    ),
    SearchMode::Extreme => (
      (40..=90).step_by(5).collect(),
      (50..=70).step_by(3).collect(),
      (70..=93).step_by(3).collect(),
      (85..=95).step_by(2).collect(),
    ),
  };

  iproduct!(pulse, dot_dash, char_gap, word_gap)
    .map(|(p, d, c, w)| DecoderParams {
      pulse_percentile: p,
      gap_percentile_dot_dash: d,
      gap_percentile_char: c,
      gap_percentile_word: w,
    })
    .collect()
}

/// Evaluates one parameter tuple against the shared envelope. A decode
/// that yields no pulses scores negative infinity so the rest of the
/// grid still competes.
fn evaluate(env: &[f32], sample_rate: u32, duration: f32, params: DecoderParams) -> Candidate {
  let result = decoder::decode_envelope(env, sample_rate, duration, params);

  // original behaviour: score the longer of the two language variants,
  // detect codes on the Latin one (callsigns are Latin-script)
  let best_text = if result.text_latin.chars().count() >= result.text_cyrillic.chars().count() {
    result.text_latin.clone()
  } else {
    result.text_cyrillic.clone()
  };
  let codes = codes::detect_codes(&result.text_latin);

  let score = if result.stats.error.is_some() {
    f32::NEG_INFINITY
  } else {
    score::quality_score(&best_text, result.stats.wpm, &codes)
  };
  let question_ratio = result.question_ratio();

  Candidate { params, score, question_ratio, result, codes }
}

/// Runs the whole grid against a precomputed envelope and returns the
/// winner. Ties break toward longer decoded text, then lower unknown
/// ratio.
pub fn tune_envelope(
  env: &[f32], sample_rate: u32, duration: f32, mode: SearchMode,
) -> Option<Candidate> {
  let grid = parameter_grid(mode);
  debug!(combinations = grid.len(), "parameter search");

  let candidates: Vec<Candidate> = if mode == SearchMode::Fast {
    grid.into_iter().map(|p| evaluate(env, sample_rate, duration, p)).collect()
  } else {
    grid.into_par_iter().map(|p| evaluate(env, sample_rate, duration, p)).collect()
  };

  best_candidate(candidates)
}

/// Reduction by (score, text length, 1 - question ratio).
pub fn best_candidate(candidates: Vec<Candidate>) -> Option<Candidate> {
  candidates.into_iter().reduce(|best, c| {
    let better = c.score > best.score
      || (c.score == best.score
        && (c.result.text_latin.chars().count() > best.result.text_latin.chars().count()
          || (c.result.text_latin.chars().count() == best.result.text_latin.chars().count()
            && c.question_ratio < best.question_ratio)));
    if better {
      c
    } else {
      best
    }
  })
}

/// Loads the file, runs the upstream stages once, then searches the
/// grid. This is the `auto` entry point.
pub fn auto_tune(path: &str, mode: SearchMode) -> Result<Option<Candidate>> {
  let (audio, sample_rate) = loader::load_audio(path, WORKING_RATE)?;
  let duration = audio.len() as f32 / sample_rate as f32;

  let baseline = MorseDecoder::with_params(DecoderParams::default())?;
  let filtered = baseline.bandpass(&audio);
  let env = baseline.envelope(&filtered);

  let best = tune_envelope(&env, sample_rate, duration, mode);
  if let Some(candidate) = &best {
    info!(
      score = candidate.score,
      wpm = candidate.result.stats.wpm,
      pulse = candidate.params.pulse_percentile,
      "search finished"
    );
  }
  Ok(best)
}

/// One experiment-mode trial: thresholds plus the passband that
/// produced them.
#[derive(Debug, Clone)]
pub struct ExperimentResult {
  pub params: DecoderParams,
  pub min_freq: f32,
  pub max_freq: f32,
  pub text: String,
  pub codes_found: usize,
  pub score: f32,
}

/// Random sample over a wider grid that also varies the passband.
/// Scores by codes found plus readability; returns trials sorted best
/// first.
pub fn experiment(path: &str, iterations: usize) -> Result<Vec<ExperimentResult>> {
  use rand::seq::SliceRandom;

  let pulse_range = [70u32, 75, 80, 85, 90];
  let dot_dash_range = [55u32, 60, 62, 65, 70];
  let char_range = [85u32, 88, 90, 92, 95];
  let min_freq_range = [300.0f32, 400.0, 500.0, 600.0];
  let max_freq_range = [1000.0f32, 1200.0, 1500.0, 2000.0];

  let mut combinations: Vec<(u32, u32, u32, f32, f32)> =
    iproduct!(pulse_range, dot_dash_range, char_range, min_freq_range, max_freq_range).collect();
  let mut rng = rand::thread_rng();
  combinations.shuffle(&mut rng);
  combinations.truncate(iterations);

  let (audio, sample_rate) = loader::load_audio(path, WORKING_RATE)?;
  let duration = audio.len() as f32 / sample_rate as f32;

  let mut results: Vec<ExperimentResult> = Vec::new();
  for (pulse, dot_dash, char_gap, min_freq, max_freq) in combinations {
    let params = DecoderParams {
      pulse_percentile: pulse,
      gap_percentile_dot_dash: dot_dash,
      gap_percentile_char: char_gap,
      gap_percentile_word: 92,
    };
    let decoder = match MorseDecoder::new(sample_rate, min_freq, max_freq, params) {
      Ok(d) => d,
      Err(_) => continue,
    };
    let filtered = decoder.bandpass(&audio);
    let env = decoder.envelope(&filtered);
    let result = decoder.decode_envelope(&env, duration);
    if result.stats.error.is_some() {
      continue;
    }

    let text = result.text_latin;
    let total = text.chars().count();
    if total == 0 {
      continue;
    }
    let unknown = text.chars().filter(|&c| c == crate::alphabet::UNKNOWN_MARK).count();
    let error_rate = unknown as f32 / total as f32 * 100.0;
    let readability = 100.0 - error_rate;

    let analysis = codes::detect_codes(&text);
    let codes_found = analysis.total_recognised() + analysis.count(codes::CodeKind::CwAbbreviation);
    let score = codes_found as f32 * 100.0 + readability - error_rate;

    results.push(ExperimentResult { params, min_freq, max_freq, text, codes_found, score });
  }

  results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
  Ok(results)
}
