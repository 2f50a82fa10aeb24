use thiserror::Error;

/// Result type alias using `DecodeError`
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Error kinds raised by the decoding core.
///
/// `NoPulses` never escapes `MorseDecoder::process_file`; it is folded
/// into a `DecodeResult` with empty text so callers (and the tuner)
/// can keep going. `Internal` indicates a broken invariant and is fatal.
#[derive(Error, Debug)]
pub enum DecodeError {
  /// Audio file missing or unreadable
  #[error("audio read failed: {0}")]
  Io(String),

  /// Normalisation divisor would be zero
  #[error("silent input: peak amplitude is zero")]
  SilentInput,

  /// Segmenter found no rising edges above threshold
  #[error("no pulses detected above threshold")]
  NoPulses,

  /// Container or bit depth not supported
  #[error("unsupported audio format: {0}")]
  UnsupportedFormat(String),

  /// Invariant violation, indicates a bug
  #[error("internal error: {0}")]
  Internal(String),
}

impl From<std::io::Error> for DecodeError {
  fn from(e: std::io::Error) -> Self {
    DecodeError::Io(e.to_string())
  }
}

impl From<hound::Error> for DecodeError {
  fn from(e: hound::Error) -> Self {
    match e {
      hound::Error::IoError(io) => DecodeError::Io(io.to_string()),
      hound::Error::Unsupported => DecodeError::UnsupportedFormat("unsupported WAV encoding".to_string()),
      other => DecodeError::Io(other.to_string()),
    }
  }
}
