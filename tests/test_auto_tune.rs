mod common;

use cwdec::error::DecodeError;
use cwdec::keying::{self, KeyingSpec};
use cwdec::report;
use cwdec::tuner::{self, SearchMode};

fn write_fixture(name: &str, spec: &KeyingSpec) -> String {
  let dir = std::env::temp_dir().join("cwdec-auto-tune");
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join(name);
  let samples = keying::synthesize(spec);
  keying::write_wav(path.to_str().unwrap(), spec.sample_rate, &samples).unwrap();
  path.to_str().unwrap().to_string()
}

#[test]
fn test_auto_tune_end_to_end() {
  let spec = KeyingSpec::padded_to_duty("CQ DE R1ABC K", 20, common::FAST_GRID_DUTY);
  let path = write_fixture("qso.wav", &spec);

  let best = tuner::auto_tune(&path, SearchMode::Fast).unwrap().unwrap();
  assert_eq!(best.result.text_latin, "CQ DE R1ABC K");
  assert!(best.score > 0.0);
  assert!(best.codes.callsigns().contains(&"R1ABC"));

  // sidecar round trip
  let config_path = report::write_config(&path, &best).unwrap();
  let record = report::read_config(&config_path).unwrap();
  assert_eq!(record.parameters, best.params);
  assert_eq!(record.quality_metrics.error_count, 0);

  let txt_path = report::write_transcript(&path, &best).unwrap();
  let transcript = std::fs::read_to_string(txt_path).unwrap();
  assert!(transcript.contains("CQ DE R1ABC K"));
  assert!(transcript.contains("R1ABC"));
}

#[test]
fn test_auto_tune_missing_file() {
  let err = tuner::auto_tune("/nonexistent/missing.wav", SearchMode::Fast).unwrap_err();
  assert!(matches!(err, DecodeError::Io(_)));
}

#[test]
fn test_auto_tune_silent_recording() {
  let dir = std::env::temp_dir().join("cwdec-auto-tune");
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("silence.wav");
  keying::write_wav(path.to_str().unwrap(), 8000, &vec![0.0f32; 16000]).unwrap();

  let err = tuner::auto_tune(path.to_str().unwrap(), SearchMode::Fast).unwrap_err();
  assert!(matches!(err, DecodeError::SilentInput));
}
