//! WAV loading, downmix, normalisation and resampling to the working rate.
use hound::{SampleFormat, WavReader};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::stats;

/// Working sample rate for the whole pipeline.
pub const WORKING_RATE: u32 = 8000;

const RESAMPLE_CHUNK: usize = 1024;

/// Reads a WAV file and returns a mono, peak-normalised sample buffer at
/// `target_rate`.
///
/// # Parameters
/// - `path`: path to the WAV file.
/// - `target_rate`: working rate the buffer is resampled to.
///
/// # Errors
/// - `UnsupportedFormat` for bit depths other than 16/32-bit int or
///   32-bit float, or more than two channels.
/// - `SilentInput` when the peak amplitude is zero.
/// - `Io` when the file cannot be opened or read.
pub fn load_audio(path: &str, target_rate: u32) -> Result<(Vec<f32>, u32)> {
  let mut reader = WavReader::open(path)?;
  let spec = reader.spec();

  let num_channels = spec.channels as usize;
  if num_channels == 0 || num_channels > 2 {
    return Err(DecodeError::UnsupportedFormat(format!("{} channels", num_channels)));
  }

  let mut channel_samples: Vec<Vec<f32>> = vec![vec![]; num_channels];

  match (spec.sample_format, spec.bits_per_sample) {
    (SampleFormat::Int, 16) => {
      for (i, sample) in reader.samples::<i16>().enumerate() {
        let sample = sample? as f32 / i16::MAX as f32;
        channel_samples[i % num_channels].push(sample);
      }
    }
    (SampleFormat::Int, 32) => {
      for (i, sample) in reader.samples::<i32>().enumerate() {
        let sample = sample? as f32 / i32::MAX as f32;
        channel_samples[i % num_channels].push(sample);
      }
    }
    (SampleFormat::Float, 32) => {
      for (i, sample) in reader.samples::<f32>().enumerate() {
        channel_samples[i % num_channels].push(sample?);
      }
    }
    (_, bits) => return Err(DecodeError::UnsupportedFormat(format!("{} bits per sample", bits))),
  }

  // Downmix by channel average
  let mono: Vec<f32> = if num_channels == 1 {
    std::mem::take(&mut channel_samples[0])
  } else {
    let len = channel_samples.iter().map(|c| c.len()).min().unwrap_or(0);
    (0..len).map(|i| (channel_samples[0][i] + channel_samples[1][i]) / 2.0).collect()
  };

  let peak = stats::peak_abs(&mono);
  if peak == 0.0 {
    return Err(DecodeError::SilentInput);
  }
  let normalised: Vec<f32> = mono.iter().map(|s| s / peak).collect();

  let out = if spec.sample_rate != target_rate {
    debug!(from = spec.sample_rate, to = target_rate, "resampling");
    resample(&normalised, spec.sample_rate, target_rate)?
  } else {
    normalised
  };

  Ok((out, target_rate))
}

/// Rational-factor sinc resampling of a mono buffer, chunked so the
/// resampler sees fixed-size input frames. Output is trimmed (or
/// zero-padded) to the length-proportional sample count.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
  let ratio = to_rate as f64 / from_rate as f64;
  let sinc_params = SincInterpolationParameters {
    sinc_len: 128,
    f_cutoff: 0.95,
    interpolation: SincInterpolationType::Cubic,
    oversampling_factor: 32,
    window: WindowFunction::BlackmanHarris2,
  };

  let mut resampler = SincFixedIn::<f32>::new(ratio, 10.0, sinc_params, RESAMPLE_CHUNK, 1)
    .map_err(|e| DecodeError::Internal(format!("resampler construction failed: {}", e)))?;

  let mut out: Vec<f32> = Vec::with_capacity((samples.len() as f64 * ratio) as usize + RESAMPLE_CHUNK);
  let mut offset = 0;
  while offset < samples.len() {
    let chunk_size = (samples.len() - offset).min(RESAMPLE_CHUNK);
    let mut chunk = vec![0.0f32; RESAMPLE_CHUNK];
    chunk[..chunk_size].copy_from_slice(&samples[offset..offset + chunk_size]);

    let processed = resampler
      .process(&[chunk.as_slice()], None)
      .map_err(|e| DecodeError::Internal(format!("resampling failed: {}", e)))?;
    out.extend_from_slice(&processed[0]);
    offset += chunk_size;
  }

  let expected = (samples.len() as f64 * ratio).round() as usize;
  out.resize(expected, 0.0);
  Ok(out)
}

#[cfg(test)]
mod test {
  use super::*;
  use std::f32::consts::PI;

  fn write_wav(path: &str, rate: u32, samples: &[f32]) {
    let spec = hound::WavSpec {
      channels: 1,
      sample_rate: rate,
      bits_per_sample: 32,
      sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
      writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
  }

  #[test]
  fn test_load_normalises_peak_to_unity() {
    let dir = std::env::temp_dir().join("cwdec-loader-norm");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("quiet.wav");
    let samples: Vec<f32> =
      (0..WORKING_RATE).map(|i| 0.2 * (2.0 * PI * 600.0 * i as f32 / WORKING_RATE as f32).sin()).collect();
    write_wav(path.to_str().unwrap(), WORKING_RATE, &samples);

    let (audio, rate) = load_audio(path.to_str().unwrap(), WORKING_RATE).unwrap();
    assert_eq!(rate, WORKING_RATE);
    let peak = crate::stats::peak_abs(&audio);
    assert!((peak - 1.0).abs() < 1e-4, "peak was {}", peak);
  }

  #[test]
  fn test_silent_file_is_rejected() {
    let dir = std::env::temp_dir().join("cwdec-loader-silent");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("silence.wav");
    write_wav(path.to_str().unwrap(), WORKING_RATE, &vec![0.0; 4000]);

    let err = load_audio(path.to_str().unwrap(), WORKING_RATE).unwrap_err();
    assert!(matches!(err, DecodeError::SilentInput));
  }

  #[test]
  fn test_missing_file_is_io_error() {
    let err = load_audio("/nonexistent/nowhere.wav", WORKING_RATE).unwrap_err();
    assert!(matches!(err, DecodeError::Io(_)));
  }

  #[test]
  fn test_resample_preserves_length_proportionally() {
    let samples: Vec<f32> =
      (0..44100).map(|i| (2.0 * PI * 600.0 * i as f32 / 44100.0).sin()).collect();
    let out = resample(&samples, 44100, WORKING_RATE).unwrap();
    assert_eq!(out.len(), (44100.0 * 8000.0 / 44100.0_f64).round() as usize);
  }
}
