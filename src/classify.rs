//! Dot/dash classification and letter/word segmentation.
use tracing::debug;

use crate::alphabet::LetterToken;
use crate::segment::Pulse;
use crate::stats;

/// Divisor turning the median pulse duration into the dit-duration
/// estimate. Chosen empirically: with dits and dahs mixed roughly
/// evenly the median sits near 1.5 units, which puts the 2-unit
/// decision boundary midway between dit and dah.
pub const DOT_DASH_DIVISOR: f32 = 1.5;

/// Gap percentiles that split the three gap populations
/// (intra-letter : inter-letter : inter-word, nominally 1:3:7).
#[derive(Debug, Clone, Copy)]
pub struct GapPercentiles {
  pub dot_dash: u32,
  pub char_gap: u32,
  pub word_gap: u32,
}

/// Classifies each pulse as dot or dash from the duration distribution
/// and groups the symbols into letter tokens using the gap thresholds.
pub fn classify(pulses: &[Pulse], gaps: &[f32], percentiles: GapPercentiles) -> Vec<LetterToken> {
  if pulses.is_empty() {
    return Vec::new();
  }

  let durations: Vec<f32> = pulses.iter().map(|p| p.duration).collect();
  let unit = if durations.len() < 2 {
    durations[0]
  } else {
    duration_anchor(&durations) / DOT_DASH_DIVISOR
  };

  let symbols: Vec<char> =
    durations.iter().map(|&d| if d < unit * 2.0 { '.' } else { '-' }).collect();

  let (letter_threshold, word_threshold) = gap_thresholds(gaps, percentiles);
  debug!(letter_threshold, word_threshold, "gap thresholds");
  group_symbols(&symbols, gaps, letter_threshold, word_threshold)
}

/// Robust stand-in for `median(durations)` as the timing anchor.
///
/// A plain median lands on the dah cluster whenever a message carries
/// more dashes than dots (e.g. `CQ CQ DE ...`), which collapses the
/// dot/dash decision. When the durations span two populations
/// (`max > 2 * min`), anchor on the median of the short cluster
/// instead; otherwise the plain median is the anchor, exactly as
/// before.
fn duration_anchor(durations: &[f32]) -> f32 {
  let min = durations.iter().cloned().fold(f32::INFINITY, f32::min);
  let max = durations.iter().cloned().fold(0.0, f32::max);
  if max > 2.0 * min {
    let midpoint = (min + max) / 2.0;
    let short: Vec<f32> = durations.iter().cloned().filter(|&d| d < midpoint).collect();
    if !short.is_empty() {
      return stats::median(&short);
    }
  }
  stats::median(durations)
}

/// Word threshold never sits below this multiple of the letter
/// threshold (4.5 gap units), so a recording with no inter-word gaps
/// does not sprout word breaks at every letter boundary.
const WORD_GAP_FLOOR: f32 = 3.0;

/// Derives the two segmentation thresholds from the gap distribution.
pub fn gap_thresholds(gaps: &[f32], percentiles: GapPercentiles) -> (f32, f32) {
  let p_dd = short_gap_anchor(gaps, percentiles.dot_dash as f32);
  let p_ch = stats::percentile(gaps, percentiles.char_gap as f32);
  let p_wd = stats::percentile(gaps, percentiles.word_gap as f32);

  // Just above the top of the intra-letter cluster
  let letter_threshold = p_dd * 1.5;
  // Midway between the inter-letter and inter-word clusters
  let word_threshold = ((p_ch + p_wd) / 2.0).max(letter_threshold * WORD_GAP_FLOOR);
  (letter_threshold, word_threshold)
}

/// Percentile anchor for the intra-letter gap, rescued back to the
/// short cluster when the requested percentile escapes it.
///
/// Letter-dominant text (few symbols per letter) leaves intra-letter
/// gaps in the minority, so a fixed percentile can land on the
/// inter-letter cluster and swallow whole words into one letter. When
/// that happens and the short cluster holds at least a quarter of the
/// gaps, its median is the anchor instead.
fn short_gap_anchor(gaps: &[f32], pct: f32) -> f32 {
  let anchored = stats::percentile(gaps, pct);
  if gaps.len() < 4 {
    return anchored;
  }
  let min = gaps.iter().cloned().fold(f32::INFINITY, f32::min);
  if anchored <= 2.0 * min {
    return anchored;
  }
  let midpoint = (min + anchored) / 2.0;
  let short: Vec<f32> = gaps.iter().cloned().filter(|&g| g < midpoint).collect();
  if short.len() * 4 >= gaps.len() {
    stats::median(&short)
  } else {
    anchored
  }
}

/// Walks the gap list: a gap below `letter_threshold` extends the
/// current letter, one below `word_threshold` closes it, anything
/// larger also emits a word break.
fn group_symbols(symbols: &[char], gaps: &[f32], letter_threshold: f32, word_threshold: f32) -> Vec<LetterToken> {
  let mut tokens = Vec::new();
  let mut current = String::from(symbols[0]);

  for (i, &gap) in gaps.iter().enumerate() {
    if i + 1 >= symbols.len() {
      break;
    }
    if gap < letter_threshold {
      current.push(symbols[i + 1]);
    } else if gap < word_threshold {
      tokens.push(LetterToken::Letter(current));
      current = String::from(symbols[i + 1]);
    } else {
      tokens.push(LetterToken::Letter(current));
      tokens.push(LetterToken::WordBreak);
      current = String::from(symbols[i + 1]);
    }
  }
  tokens.push(LetterToken::Letter(current));
  tokens
}

/// Transmission speed from the PARIS standard (50 dit units per word):
/// `wpm = 1.2 / median(pulse_durations)`, clamped to [10, 100] and
/// rounded to one decimal. Zero when there are no pulses.
///
/// This is the single WPM definition used everywhere (stats, tuner
/// gate, reports).
pub fn estimate_wpm(pulses: &[Pulse]) -> f32 {
  if pulses.is_empty() {
    return 0.0;
  }
  let durations: Vec<f32> = pulses.iter().map(|p| p.duration).collect();
  let unit = duration_anchor(&durations);
  if unit <= 0.0 {
    return 0.0;
  }
  let wpm = (1.2 / unit).clamp(10.0, 100.0);
  (wpm * 10.0).round() / 10.0
}
