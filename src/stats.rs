//! Small statistical reductions shared across the pipeline.

/// Linear-interpolated percentile over unsorted data.
///
/// # Parameters
/// - `values`: sample population, need not be sorted.
/// - `pct`: percentile in [0, 100].
///
/// # Returns
/// The interpolated percentile, or 0.0 for an empty slice.
pub fn percentile(values: &[f32], pct: f32) -> f32 {
  if values.is_empty() {
    return 0.0;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
  let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
  let lo = rank.floor() as usize;
  let hi = rank.ceil() as usize;
  if lo == hi {
    sorted[lo]
  } else {
    let frac = rank - lo as f32;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
  }
}

pub fn median(values: &[f32]) -> f32 {
  percentile(values, 50.0)
}

pub fn mean(values: &[f32]) -> f32 {
  if values.is_empty() {
    return 0.0;
  }
  values.iter().sum::<f32>() / values.len() as f32
}

/// Population variance
pub fn variance(values: &[f32]) -> f32 {
  if values.is_empty() {
    return 0.0;
  }
  let m = mean(values);
  values.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / values.len() as f32
}

pub fn std_dev(values: &[f32]) -> f32 {
  variance(values).sqrt()
}

/// Coefficient of variation; 0.0 when the mean is zero.
pub fn coefficient_of_variation(values: &[f32]) -> f32 {
  let m = mean(values);
  if m == 0.0 {
    0.0
  } else {
    std_dev(values) / m
  }
}

pub fn peak_abs(values: &[f32]) -> f32 {
  values.iter().map(|v| v.abs()).fold(0.0, f32::max)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_percentile_interpolates() {
    let xs = vec![1.0, 2.0, 3.0, 4.0];
    assert_eq!(percentile(&xs, 0.0), 1.0);
    assert_eq!(percentile(&xs, 100.0), 4.0);
    assert_eq!(percentile(&xs, 50.0), 2.5);
  }

  #[test]
  fn test_percentile_unsorted_input() {
    let xs = vec![9.0, 1.0, 5.0];
    assert_eq!(median(&xs), 5.0);
  }

  #[test]
  fn test_empty_slices() {
    assert_eq!(percentile(&[], 50.0), 0.0);
    assert_eq!(mean(&[]), 0.0);
    assert_eq!(std_dev(&[]), 0.0);
  }

  #[test]
  fn test_cv_of_constant_sequence_is_zero() {
    let xs = vec![2.0; 8];
    assert_eq!(coefficient_of_variation(&xs), 0.0);
  }
}
