//! Result files written next to each processed recording: a
//! machine-readable parameter/metrics record and a sectioned
//! human-readable transcript.
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::analyzer::{SignalAnalysis, SkillTier};
use crate::codes::{CodeAnalysis, CodeKind};
use crate::decoder::DecoderParams;
use crate::error::{DecodeError, Result};
use crate::tuner::Candidate;

/// Sidecar record carrying the winning parameters and quality
/// metrics, stored as `<recording>.config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
  pub audio_file: String,
  pub parameters: DecoderParams,
  pub quality_metrics: QualityMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
  pub score: f32,
  pub wpm: f32,
  pub text_length: usize,
  pub error_count: usize,
  pub error_ratio: f32,
  pub callsigns_found: usize,
}

impl ConfigRecord {
  pub fn from_candidate(audio_path: &str, candidate: &Candidate) -> ConfigRecord {
    let text = &candidate.result.text_latin;
    ConfigRecord {
      audio_file: file_name(audio_path),
      parameters: candidate.params,
      quality_metrics: QualityMetrics {
        score: candidate.score,
        wpm: candidate.result.stats.wpm,
        text_length: text.chars().count(),
        error_count: text.chars().filter(|&c| c == crate::alphabet::UNKNOWN_MARK).count(),
        error_ratio: candidate.question_ratio,
        callsigns_found: candidate.codes.callsigns().len(),
      },
    }
  }
}

/// Writes `<base>.config.json` next to the recording. Returns the
/// path written.
pub fn write_config(audio_path: &str, candidate: &Candidate) -> Result<String> {
  let record = ConfigRecord::from_candidate(audio_path, candidate);
  let out_path = sidecar_path(audio_path, "config.json");
  let json = serde_json::to_string_pretty(&record)
    .map_err(|e| DecodeError::Internal(format!("config serialisation failed: {}", e)))?;
  std::fs::write(&out_path, json)?;
  Ok(out_path)
}

/// Reads decoder parameters back from a sidecar config.
pub fn read_config(path: &str) -> Result<ConfigRecord> {
  let raw = std::fs::read_to_string(path)?;
  serde_json::from_str(&raw).map_err(|e| DecodeError::Io(format!("bad config {}: {}", path, e)))
}

/// Writes the sectioned human-readable transcript as `<base>.txt`.
/// Returns the path written.
pub fn write_transcript(audio_path: &str, candidate: &Candidate) -> Result<String> {
  let out_path = sidecar_path(audio_path, "txt");
  std::fs::write(&out_path, render_transcript(audio_path, candidate))?;
  Ok(out_path)
}

fn render_transcript(audio_path: &str, candidate: &Candidate) -> String {
  let rule = "=".repeat(80);
  let result = &candidate.result;
  let codes = &candidate.codes;
  let mut out = String::new();

  let _ = writeln!(out, "{}", rule);
  let _ = writeln!(out, "MORSE DECODE TRANSCRIPT");
  let _ = writeln!(out, "{}\n", rule);

  let _ = writeln!(out, "## RECORDING\n");
  let _ = writeln!(out, "File:        {}", file_name(audio_path));
  let _ = writeln!(out, "Duration:    {:.1} s", result.stats.duration);
  let _ = writeln!(out, "Speed:       {:.1} WPM", result.stats.wpm);
  let _ = writeln!(
    out,
    "Quality:     {:.1}% recognised",
    (1.0 - candidate.question_ratio) * 100.0
  );
  let _ = writeln!(out, "Characters:  {}\n", result.text_latin.chars().count());

  let _ = writeln!(out, "## DETECTED ELEMENTS\n");
  let _ = writeln!(out, "Callsigns:         {}", codes.callsigns().len());
  let _ = writeln!(out, "Q-codes:           {}", codes.count(CodeKind::QCode));
  let _ = writeln!(out, "Z-codes:           {}", codes.count(CodeKind::ZCode));
  let _ = writeln!(out, "Prosigns:          {}", codes.count(CodeKind::Prosign));
  let _ = writeln!(out, "CW abbreviations:  {}\n", codes.count(CodeKind::CwAbbreviation));

  let _ = writeln!(out, "{}", rule);
  let _ = writeln!(out, "DECODED TEXT (LATIN)");
  let _ = writeln!(out, "{}\n", rule);
  let _ = writeln!(out, "{}\n", result.text_latin);

  let _ = writeln!(out, "{}", rule);
  let _ = writeln!(out, "DECODED TEXT (CYRILLIC)");
  let _ = writeln!(out, "{}\n", rule);
  let _ = writeln!(out, "{}\n", result.text_cyrillic);

  if !result.stats.morse_code.is_empty() {
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "MORSE CODE");
    let _ = writeln!(out, "{}\n", rule);
    let _ = writeln!(out, "{}\n", result.stats.morse_code);
  }

  let _ = writeln!(out, "{}", rule);
  let _ = writeln!(out, "DECODER PARAMETERS");
  let _ = writeln!(out, "{}\n", rule);
  let _ = writeln!(out, "Pulse percentile:      {}", candidate.params.pulse_percentile);
  let _ = writeln!(out, "Dot-dash gap:          {}", candidate.params.gap_percentile_dot_dash);
  let _ = writeln!(out, "Character gap:         {}", candidate.params.gap_percentile_char);
  let _ = writeln!(out, "Word gap:              {}", candidate.params.gap_percentile_word);
  let _ = writeln!(out, "Pulses detected:       {}", result.stats.pulses);
  let _ = writeln!(out, "Quality score:         {:.1}\n", candidate.score);

  if let Some(analysis) = &result.stats.signal_analysis {
    let _ = write!(out, "{}", render_analysis(analysis, &rule));
  }

  let detected: Vec<_> = codes.detections.iter().collect();
  if !detected.is_empty() {
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "DETECTED CODES");
    let _ = writeln!(out, "{}\n", rule);
    for d in detected {
      match d.meaning {
        Some(meaning) => {
          let _ = writeln!(out, "  {:?}  {} - {}", d.kind, d.code, meaning);
        }
        None => {
          let _ = writeln!(out, "  {:?}  {}", d.kind, d.code);
        }
      }
    }
    let _ = writeln!(out);
  }

  out
}

fn render_analysis(analysis: &SignalAnalysis, rule: &str) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", rule);
  let _ = writeln!(out, "SIGNAL ANALYSIS");
  let _ = writeln!(out, "{}\n", rule);

  let m = &analysis.modulation;
  let _ = writeln!(out, "Modulation:        {:?} ({}% confidence)", m.modulation_type, m.confidence);
  let _ = writeln!(out, "Dominant tone:     {:.1} Hz", m.dominant_frequency);
  let _ = writeln!(out, "Bandwidth:         {:.1} Hz", m.bandwidth);
  let _ = writeln!(out, "Spectral peaks:    {}\n", m.num_peaks);

  let p = &analysis.purity;
  let _ = writeln!(out, "Purity score:      {:.1}/100", p.purity_score);
  let _ = writeln!(out, "Chirp:             {:.1}", p.chirp);
  let _ = writeln!(out, "Clicks:            {}", p.clicks);
  let _ = writeln!(out, "Noise level:       {:.1}%", p.noise_level);
  let _ = writeln!(out, "SNR estimate:      {:.1} dB", p.snr_estimate);
  let _ = writeln!(out, "QRM detected:      {}\n", if p.qrm_detected { "yes" } else { "no" });

  let s = &analysis.operator_skill;
  let _ = writeln!(out, "Operator level:    {:?}", s.skill_level);
  if s.skill_level != SkillTier::Unknown {
    let _ = writeln!(out, "Skill score:       {:.1}/100", s.skill_score);
    let _ = writeln!(out, "Timing stability:  {:.1}/100", s.timing_stability);
    let _ = writeln!(out, "Rhythm:            {:.1}/100", s.rhythm_consistency);
    let _ = writeln!(out, "Dot/dash ratio:    {:.2} (ideal 3.0)", s.dot_dash_ratio);
  }
  let _ = writeln!(out);
  out
}

fn file_name(path: &str) -> String {
  Path::new(path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string())
}

/// `<dir>/<stem>.<ext>` next to the recording.
fn sidecar_path(audio_path: &str, ext: &str) -> String {
  let path = Path::new(audio_path);
  path.with_extension(ext).to_string_lossy().into_owned()
}
