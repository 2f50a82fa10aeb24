use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use cwdec::cache::ResultCache;
use cwdec::codes;
use cwdec::decoder::{DecoderParams, MorseDecoder};
use cwdec::keying::{self, KeyingSpec};
use cwdec::loader::WORKING_RATE;
use cwdec::report;
use cwdec::splitter::MultiSignalDecoder;
use cwdec::tuner::{self, SearchMode};

#[derive(Parser)]
#[command(name = "cwdec", about = "CW (Morse) decoder for WebSDR-style recordings")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Search decoding thresholds for one recording and write reports
  Auto {
    file: String,
    /// fast, thorough or extreme
    #[arg(long, default_value = "fast")]
    mode: SearchMode,
  },
  /// Run the threshold search over every WAV file in a directory
  Batch {
    folder: String,
    #[arg(long, default_value = "fast")]
    mode: SearchMode,
    /// Worker threads; 0 means one per hardware thread
    #[arg(long, default_value_t = 0)]
    workers: usize,
  },
  /// Split overlapping transmissions on distinct tones and decode each
  Multi {
    file: String,
    /// Maximum number of signals to look for
    #[arg(long, default_value_t = 3)]
    peaks: usize,
    #[arg(long)]
    analyze: bool,
  },
  /// Decode with fixed parameters, from a sidecar config when present
  Decode {
    file: String,
    /// Explicit .config.json path
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    analyze: bool,
  },
  /// Randomised search that also varies the passband
  Experiment {
    file: String,
    #[arg(long, default_value_t = 30)]
    iterations: usize,
  },
  /// Synthesise a keyed CW recording (calibration aid)
  Synth {
    text: String,
    output: String,
    #[arg(long, default_value_t = 20)]
    wpm: u32,
    #[arg(long, default_value_t = 600.0)]
    freq: f32,
    /// Add white noise at this SNR in dB
    #[arg(long)]
    snr: Option<f32>,
  },
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "cwdec=warn".into()),
    )
    .init();

  let cli = Cli::parse();
  let code = match run(cli.command) {
    Ok(code) => code,
    Err(e) => {
      eprintln!("error: {}", e);
      1
    }
  };
  process::exit(code);
}

fn run(command: Commands) -> cwdec::Result<i32> {
  match command {
    Commands::Auto { file, mode } => cmd_auto(&file, mode),
    Commands::Batch { folder, mode, workers } => cmd_batch(&folder, mode, workers),
    Commands::Multi { file, peaks, analyze } => cmd_multi(&file, peaks, analyze),
    Commands::Decode { file, config, analyze } => cmd_decode(&file, config.as_deref(), analyze),
    Commands::Experiment { file, iterations } => cmd_experiment(&file, iterations),
    Commands::Synth { text, output, wpm, freq, snr } => cmd_synth(&text, &output, wpm, freq, snr),
  }
}

fn cmd_auto(file: &str, mode: SearchMode) -> cwdec::Result<i32> {
  println!("searching thresholds for {} ({:?} mode)", file, mode);

  let best = match tuner::auto_tune(file, mode)? {
    Some(candidate) if candidate.score.is_finite() => candidate,
    _ => {
      println!("no decodable signal found");
      return Ok(1);
    }
  };

  println!();
  println!("parameters: pulse={} dd={} char={} word={}",
    best.params.pulse_percentile,
    best.params.gap_percentile_dot_dash,
    best.params.gap_percentile_char,
    best.params.gap_percentile_word);
  println!("score:      {:.1}", best.score);
  println!("speed:      {:.1} WPM", best.result.stats.wpm);
  println!("errors:     {:.1}%", best.question_ratio * 100.0);
  println!();
  println!("latin:    {}", best.result.text_latin);
  println!("cyrillic: {}", best.result.text_cyrillic);

  let txt = report::write_transcript(file, &best)?;
  let config = report::write_config(file, &best)?;
  println!();
  println!("wrote {}", txt);
  println!("wrote {}", config);
  Ok(0)
}

fn cmd_batch(folder: &str, mode: SearchMode, workers: usize) -> cwdec::Result<i32> {
  let mut wav_files: Vec<PathBuf> = std::fs::read_dir(folder)?
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| p.extension().map(|x| x.eq_ignore_ascii_case("wav")).unwrap_or(false))
    .collect();
  wav_files.sort();

  if wav_files.is_empty() {
    println!("no WAV files in {}", folder);
    return Ok(1);
  }

  if workers > 0 {
    let _ = rayon::ThreadPoolBuilder::new().num_threads(workers).build_global();
  }
  println!("processing {} files ({:?} mode)", wav_files.len(), mode);

  let cache = Arc::new(ResultCache::default());
  let outcomes: Vec<(String, bool)> = wav_files
    .par_iter()
    .map(|path| {
      let name = path.display().to_string();
      let ok = process_one(&name, mode, &cache);
      (name, ok)
    })
    .collect();

  let decoded = outcomes.iter().filter(|(_, ok)| *ok).count();
  println!();
  for (name, ok) in &outcomes {
    println!("{} {}", if *ok { "ok  " } else { "fail" }, name);
  }
  println!("{}/{} files decoded", decoded, outcomes.len());
  Ok(if decoded > 0 { 0 } else { 1 })
}

/// One batch unit: a failure here never stops the other files.
fn process_one(file: &str, mode: SearchMode, cache: &ResultCache) -> bool {
  let best = match tuner::auto_tune(file, mode) {
    Ok(Some(candidate)) if candidate.score.is_finite() => candidate,
    Ok(_) => return false,
    Err(e) => {
      eprintln!("{}: {}", file, e);
      return false;
    }
  };

  if let Some(key) = cwdec::cache::CacheKey::for_file(file, best.params, false) {
    cache.insert(key, best.result.clone());
  }
  report::write_transcript(file, &best).is_ok() && report::write_config(file, &best).is_ok()
}

fn cmd_multi(file: &str, peaks: usize, analyze: bool) -> cwdec::Result<i32> {
  let splitter = MultiSignalDecoder { sample_rate: WORKING_RATE, num_peaks: peaks, analyze };
  let result = splitter.decode_file(file)?;

  println!("peaks: {} found", result.peak_info.count);
  for (freq, amp) in result.peak_info.frequencies.iter().zip(&result.peak_info.amplitudes) {
    println!("  {:.0} Hz (amplitude {:.2})", freq, amp);
  }
  if result.peak_info.is_single_signal {
    if let Some(warning) = &result.peak_info.warning {
      println!("note: {}", warning);
    }
    println!("this looks like a single signal; `cwdec auto` may serve better");
  }

  if result.signals.is_empty() {
    println!("no signal decoded in any band");
    return Ok(1);
  }
  for (i, signal) in result.signals.iter().enumerate() {
    println!();
    println!("signal {} at {:.0}-{:.0} Hz", i + 1, signal.frequency_band.0, signal.frequency_band.1);
    println!("  quality: {:.1}%  speed: {:.1} WPM  pulses: {}", signal.quality, signal.wpm, signal.pulses);
    println!("  text: {}", signal.text);
    if let Some(analysis) = &signal.signal_analysis {
      println!("  modulation: {:?}  purity: {:.1}  operator: {:?}",
        analysis.modulation.modulation_type,
        analysis.purity.purity_score,
        analysis.operator_skill.skill_level);
    }
  }
  Ok(0)
}

fn cmd_decode(file: &str, config: Option<&str>, analyze: bool) -> cwdec::Result<i32> {
  let params = match config_params(file, config) {
    Some(p) => {
      println!("using sidecar parameters");
      p
    }
    None => DecoderParams::default(),
  };

  let decoder = MorseDecoder::new(WORKING_RATE, 400.0, 1200.0, params)?;
  let cache = ResultCache::default();
  let result = decoder.process_file(file, analyze, Some(&cache))?;

  if let Some(error) = &result.stats.error {
    println!("decode failed: {}", error);
    return Ok(1);
  }

  println!("speed:    {:.1} WPM over {:.1} s, {} pulses", result.stats.wpm, result.stats.duration, result.stats.pulses);
  println!("latin:    {}", result.text_latin);
  println!("cyrillic: {}", result.text_cyrillic);
  println!("morse:    {}", result.stats.morse_code);

  let analysis = codes::detect_codes(&result.text_latin);
  let callsigns = analysis.callsigns();
  if !callsigns.is_empty() {
    println!("callsigns: {}", callsigns.join(" "));
  }
  for detection in &analysis.detections {
    if let Some(meaning) = detection.meaning {
      println!("  {} - {}", detection.code, meaning);
    }
  }

  if let Some(signal) = &result.stats.signal_analysis {
    println!("modulation: {:?} ({}%)", signal.modulation.modulation_type, signal.modulation.confidence);
    println!("purity:     {:.1}/100, SNR {:.1} dB", signal.purity.purity_score, signal.purity.snr_estimate);
    println!("operator:   {:?} ({:.1}/100)", signal.operator_skill.skill_level, signal.operator_skill.skill_score);
  }
  Ok(0)
}

/// Sidecar parameter lookup: explicit path, else `<file>.config.json`.
fn config_params(file: &str, explicit: Option<&str>) -> Option<DecoderParams> {
  let path = match explicit {
    Some(p) => p.to_string(),
    None => Path::new(file).with_extension("config.json").to_string_lossy().into_owned(),
  };
  report::read_config(&path).ok().map(|record| record.parameters)
}

fn cmd_experiment(file: &str, iterations: usize) -> cwdec::Result<i32> {
  println!("experimenting with {} random configurations", iterations);
  let results = tuner::experiment(file, iterations)?;
  if results.is_empty() {
    println!("nothing decoded in any trial");
    return Ok(1);
  }

  for (i, trial) in results.iter().take(5).enumerate() {
    println!();
    println!("#{} score {:.1} ({} codes), pulse={} dd={} char={}, band {:.0}-{:.0} Hz",
      i + 1,
      trial.score,
      trial.codes_found,
      trial.params.pulse_percentile,
      trial.params.gap_percentile_dot_dash,
      trial.params.gap_percentile_char,
      trial.min_freq,
      trial.max_freq);
    let preview: String = trial.text.chars().take(120).collect();
    println!("   {}", preview);
  }
  Ok(0)
}

fn cmd_synth(text: &str, output: &str, wpm: u32, freq: f32, snr: Option<f32>) -> cwdec::Result<i32> {
  let mut spec = KeyingSpec::padded_to_duty(text, wpm, 0.155);
  spec.frequency = freq;
  spec.snr_db = snr;
  let samples = keying::synthesize(&spec);
  keying::write_wav(output, spec.sample_rate, &samples)?;
  println!("wrote {} ({:.1} s at {} WPM, {:.0} Hz)", output, samples.len() as f32 / spec.sample_rate as f32, wpm, freq);
  Ok(0)
}
