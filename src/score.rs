//! Composite decode-quality score driving the parameter search.
use crate::alphabet;
use crate::codes::CodeAnalysis;

/// Scores a decode; higher is better and values may go negative.
///
/// The terms, with fixed constants:
/// - base `min(len/10, 100)` for having content at all,
/// - penalty `-200 * (unknown / len)` for unrecognised letters,
/// - `+10` per recognised code, `+5` extra per callsign,
/// - `+20` when WPM falls in the plausible 5..=40 band, else `-30`.
///
/// Holding everything else fixed, the score never increases when the
/// unknown-letter count grows.
pub fn quality_score(text: &str, wpm: f32, codes: &CodeAnalysis) -> f32 {
  if text.is_empty() {
    return 0.0;
  }

  let text_length = text.chars().count();
  let error_marks = text.chars().filter(|&c| c == alphabet::UNKNOWN_MARK).count();
  let question_ratio = error_marks as f32 / text_length as f32;

  let mut score = 0.0;
  score += (text_length as f32 / 10.0).min(100.0);
  score -= question_ratio * 200.0;
  score += codes.total_recognised() as f32 * 10.0;
  score += codes.callsigns().len() as f32 * 5.0;

  if (5.0..=40.0).contains(&wpm) {
    score += 20.0;
  } else {
    score -= 30.0;
  }

  score
}
