use cwdec::keying::{synthesize, KeyingSpec};

/// Duty cycle at which the default pulse percentile (85) lands on the
/// key ramps of a synthesised recording.
pub const DECODE_DUTY: f32 = 0.155;

/// Duty cycle suiting the fast search grid (pulse percentile 80).
pub const FAST_GRID_DUTY: f32 = 0.21;

pub fn keyed_recording(text: &str, wpm: u32, frequency: f32, snr_db: Option<f32>) -> Vec<f32> {
  let mut spec = KeyingSpec::padded_to_duty(text, wpm, DECODE_DUTY);
  spec.frequency = frequency;
  spec.snr_db = snr_db;
  synthesize(&spec)
}

/// Mixes two recordings sample-wise, zero-padding the shorter one.
pub fn mix(a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
  let len = a.len().max(b.len());
  (0..len)
    .map(|i| {
      let x = a.get(i).copied().unwrap_or(0.0);
      let y = b.get(i).copied().unwrap_or(0.0);
      (x + y) / 2.0
    })
    .collect()
}
