//! Percentile-threshold binarisation of the envelope into pulses and gaps.
use crate::stats;

/// One keyed-down region, in seconds from the start of the recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
  pub start: f32,
  pub end: f32,
  pub duration: f32,
}

/// Thresholds the envelope at `percentile(envelope, pulse_percentile)`
/// and walks the rising/falling edges of the binarised sequence.
///
/// Returns pulses ordered by start time and the gaps between adjacent
/// pulses (`gaps.len() == pulses.len() - 1` whenever pulses exist).
/// A buffer that ends mid-pulse closes the trailing pulse at the last
/// sample. No rising edge above threshold yields empty lists; the
/// caller decides how to surface that.
pub fn detect_pulses(envelope: &[f32], sample_rate: u32, pulse_percentile: u32) -> (Vec<Pulse>, Vec<f32>) {
  if envelope.is_empty() {
    return (Vec::new(), Vec::new());
  }

  let threshold = stats::percentile(envelope, pulse_percentile as f32);

  // First difference of the zero-bracketed binary sequence: +1 marks a
  // rising edge at index i, -1 a falling edge.
  let mut starts: Vec<usize> = Vec::new();
  let mut ends: Vec<usize> = Vec::new();
  let mut prev = 0i8;
  for (i, &value) in envelope.iter().enumerate() {
    let bit = if value > threshold { 1i8 } else { 0i8 };
    if bit > prev {
      starts.push(i);
    } else if bit < prev {
      ends.push(i);
    }
    prev = bit;
  }
  if prev == 1 {
    ends.push(envelope.len());
  }

  let rate = sample_rate as f32;
  let pulses: Vec<Pulse> = starts
    .iter()
    .zip(ends.iter())
    .map(|(&s, &e)| Pulse {
      start: s as f32 / rate,
      end: e as f32 / rate,
      duration: (e - s) as f32 / rate,
    })
    .collect();

  let gaps: Vec<f32> = pulses.windows(2).map(|w| w[1].start - w[0].end).collect();

  (pulses, gaps)
}

#[cfg(test)]
mod test {
  use super::*;

  const RATE: u32 = 1000;

  fn square_envelope(spans: &[(usize, usize)], len: usize) -> Vec<f32> {
    let mut env = vec![0.0f32; len];
    for &(s, e) in spans {
      for v in &mut env[s..e] {
        *v = 1.0;
      }
    }
    env
  }

  #[test]
  fn test_two_pulses_one_gap() {
    let env = square_envelope(&[(100, 200), (300, 450)], 1000);
    let (pulses, gaps) = detect_pulses(&env, RATE, 80);
    assert_eq!(pulses.len(), 2);
    assert_eq!(gaps.len(), 1);
    assert!((pulses[0].start - 0.1).abs() < 1e-6);
    assert!((pulses[0].duration - 0.1).abs() < 1e-6);
    assert!((gaps[0] - 0.1).abs() < 1e-6);
    for p in &pulses {
      assert!(p.end > p.start);
      assert!((p.duration - (p.end - p.start)).abs() < 1e-6);
    }
  }

  #[test]
  fn test_trailing_pulse_is_closed_at_buffer_end() {
    let env = square_envelope(&[(900, 1000)], 1000);
    let (pulses, gaps) = detect_pulses(&env, RATE, 50);
    assert_eq!(pulses.len(), 1);
    assert!(gaps.is_empty());
    assert!((pulses[0].end - 1.0).abs() < 1e-6);
  }

  #[test]
  fn test_flat_envelope_produces_nothing() {
    // every sample equals the threshold, so nothing is strictly above it
    let env = vec![0.5f32; 500];
    let (pulses, gaps) = detect_pulses(&env, RATE, 80);
    assert!(pulses.is_empty());
    assert!(gaps.is_empty());
  }

  #[test]
  fn test_empty_envelope() {
    let (pulses, gaps) = detect_pulses(&[], RATE, 80);
    assert!(pulses.is_empty());
    assert!(gaps.is_empty());
  }

  #[test]
  fn test_gap_count_invariant() {
    let env = square_envelope(&[(0, 50), (100, 150), (200, 260), (400, 410)], 1000);
    let (pulses, gaps) = detect_pulses(&env, RATE, 70);
    assert_eq!(gaps.len(), pulses.len().saturating_sub(1));
  }
}
