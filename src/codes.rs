//! Detection of procedural elements in decoded text: Q/Z codes, CW
//! abbreviations, prosigns and callsigns. Pure table lookup over
//! words; fuzzy matching and registry lookups live outside this core.
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

pub static Q_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
  HashMap::from([
    ("QRA", "Name of my station is ..."),
    ("QRK", "Readability of your signals is ..."),
    ("QRL", "I am busy, please do not interfere"),
    ("QRM", "I am being interfered with"),
    ("QRN", "I am troubled by static"),
    ("QRO", "Increase transmitter power"),
    ("QRP", "Decrease transmitter power"),
    ("QRQ", "Send faster"),
    ("QRS", "Send more slowly"),
    ("QRT", "Stop sending"),
    ("QRU", "I have nothing for you"),
    ("QRV", "I am ready"),
    ("QRX", "I will call you again"),
    ("QRZ", "Who is calling me?"),
    ("QSA", "Strength of your signals is ..."),
    ("QSB", "Your signals are fading"),
    ("QSK", "I can hear you between my signals"),
    ("QSL", "I acknowledge receipt"),
    ("QSO", "I can communicate with ... direct"),
    ("QSP", "I will relay to ..."),
    ("QSY", "Change frequency"),
    ("QTH", "My position is ..."),
    ("QTR", "Exact time is ..."),
  ])
});

/// Military procedural Z-codes (ACP-131 subset).
pub static Z_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
  HashMap::from([
    ("ZAN", "We can receive absolutely nothing"),
    ("ZAP", "Acknowledge, please"),
    ("ZBW", "Shift to the backup frequency"),
    ("ZFB", "Your signals are fading badly"),
    ("ZGS", "Your speed key is improperly adjusted"),
    ("ZOK", "We are receiving OK"),
    ("ZUG", "Negative"),
    ("ZUJ", "Stand by"),
  ])
});

pub static CW_ABBREVIATIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
  HashMap::from([
    ("AGN", "Again"),
    ("ANT", "Antenna"),
    ("BK", "Break"),
    ("CL", "Closing station"),
    ("CQ", "Calling any station"),
    ("CUL", "See you later"),
    ("DE", "From"),
    ("DX", "Long distance"),
    ("ES", "And"),
    ("FB", "Fine business"),
    ("GA", "Good afternoon"),
    ("GE", "Good evening"),
    ("GM", "Good morning"),
    ("HR", "Here"),
    ("HW", "How copy?"),
    ("K", "Go ahead"),
    ("NR", "Number"),
    ("NW", "Now"),
    ("OM", "Old man"),
    ("OP", "Operator"),
    ("PSE", "Please"),
    ("PWR", "Power"),
    ("R", "Received"),
    ("RIG", "Station equipment"),
    ("RPT", "Repeat"),
    ("RST", "Signal report"),
    ("SRI", "Sorry"),
    ("TNX", "Thanks"),
    ("TU", "Thank you"),
    ("UR", "Your"),
    ("VY", "Very"),
    ("WX", "Weather"),
    ("73", "Best regards"),
    ("88", "Love and kisses"),
  ])
});

/// Meanings for prosigns decoded as `<NAME>`.
pub static PROSIGN_MEANINGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
  HashMap::from([
    ("AR", "End of message"),
    ("SK", "End of contact"),
    ("BT", "Section separator"),
    ("CT", "Start of transmission"),
    ("KN", "Named station go ahead"),
    ("AS", "Wait"),
    ("HH", "Error"),
    ("SN", "Understood"),
  ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodeKind {
  QCode,
  ZCode,
  CwAbbreviation,
  Prosign,
  Callsign,
}

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
  pub kind: CodeKind,
  pub code: String,
  pub meaning: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageType {
  ProceduralCommand,
  OperationalMessage,
  GeneralCommunication,
  Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageStructure {
  pub has_start: bool,
  pub has_end: bool,
  pub has_separator: bool,
  pub has_callsign: bool,
  pub probable_type: MessageType,
}

/// Everything found in one decoded text.
#[derive(Debug, Clone, Serialize)]
pub struct CodeAnalysis {
  pub detections: Vec<Detection>,
  pub structure: MessageStructure,
}

impl CodeAnalysis {
  pub fn count(&self, kind: CodeKind) -> usize {
    self.detections.iter().filter(|d| d.kind == kind).count()
  }

  pub fn callsigns(&self) -> Vec<&str> {
    self
      .detections
      .iter()
      .filter(|d| d.kind == CodeKind::Callsign)
      .map(|d| d.code.as_str())
      .collect()
  }

  /// Count feeding the quality score: Q-codes + Z-codes + prosigns +
  /// callsigns.
  pub fn total_recognised(&self) -> usize {
    self.count(CodeKind::QCode)
      + self.count(CodeKind::ZCode)
      + self.count(CodeKind::Prosign)
      + self.count(CodeKind::Callsign)
  }
}

/// Scans decoded text for procedural elements. Prosigns are pulled out
/// of each word first (they can fuse with neighbouring letters), then
/// whole words are checked against the tables and the callsign shape.
pub fn detect_codes(text: &str) -> CodeAnalysis {
  let upper = text.to_uppercase();
  let words: Vec<&str> = upper.split_whitespace().collect();

  let mut detections: Vec<Detection> = Vec::new();
  let mut callsigns: Vec<String> = Vec::new();

  for word in &words {
    for name in embedded_prosigns(word) {
      if let Some(&meaning) = PROSIGN_MEANINGS.get(name) {
        detections.push(Detection {
          kind: CodeKind::Prosign,
          code: name.to_string(),
          meaning: Some(meaning),
        });
      }
    }
    if word.starts_with('<') && word.ends_with('>') {
      continue;
    }

    if let Some(&meaning) = Q_CODES.get(word) {
      detections.push(Detection { kind: CodeKind::QCode, code: word.to_string(), meaning: Some(meaning) });
    }
    if let Some(&meaning) = Z_CODES.get(word) {
      detections.push(Detection { kind: CodeKind::ZCode, code: word.to_string(), meaning: Some(meaning) });
    }
    if let Some(&meaning) = CW_ABBREVIATIONS.get(word) {
      detections.push(Detection {
        kind: CodeKind::CwAbbreviation,
        code: word.to_string(),
        meaning: Some(meaning),
      });
    }
    if is_callsign(word) && !callsigns.contains(&word.to_string()) {
      callsigns.push(word.to_string());
    }
  }

  for joined in find_spaced_callsigns(&words) {
    if !callsigns.contains(&joined) {
      callsigns.push(joined);
    }
  }

  let structure = analyze_structure(&words, &detections, !callsigns.is_empty());

  detections.extend(
    callsigns
      .into_iter()
      .map(|code| Detection { kind: CodeKind::Callsign, code, meaning: None }),
  );

  CodeAnalysis { detections, structure }
}

/// Extracts `<NAME>` spans from a word.
fn embedded_prosigns(word: &str) -> Vec<&str> {
  let mut found = Vec::new();
  let mut rest = word;
  while let Some(open) = rest.find('<') {
    let Some(close) = rest[open..].find('>') else { break };
    let name = &rest[open + 1..open + close];
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase()) {
      found.push(name);
    }
    rest = &rest[open + close + 1..];
  }
  found
}

/// Standard callsign shape: 1-2 letters, one digit, then 1-4 letters or
/// digits, 3 to 10 characters in total.
pub fn is_callsign(word: &str) -> bool {
  if word.len() < 3 || word.len() > 10 {
    return false;
  }
  let chars: Vec<char> = word.chars().collect();
  if !chars.iter().all(|c| c.is_ascii_alphanumeric()) {
    return false;
  }
  let digit_pos = match chars.iter().position(|c| c.is_ascii_digit()) {
    Some(p) => p,
    None => return false,
  };
  if digit_pos == 0 || digit_pos > 2 {
    return false;
  }
  let suffix = &chars[digit_pos + 1..];
  if suffix.is_empty() || suffix.len() > 4 {
    return false;
  }
  chars[..digit_pos].iter().all(|c| c.is_ascii_alphabetic())
}

/// Reassembles callsigns keyed with gaps between every letter
/// (`R 1 A B C` -> `R1ABC`): runs of short words are joined, checked
/// against the callsign shape, scored, and the best non-overlapping
/// candidates win.
fn find_spaced_callsigns(words: &[&str]) -> Vec<String> {
  let short_indices: Vec<usize> =
    words.iter().enumerate().filter(|(_, w)| w.len() <= 2).map(|(i, _)| i).collect();
  if short_indices.len() < 3 {
    return Vec::new();
  }

  struct Candidate {
    callsign: String,
    start: usize,
    end: usize,
    score: i32,
  }

  const WINDOW: usize = 10;
  let mut candidates: Vec<Candidate> = Vec::new();

  for (idx, &i) in short_indices.iter().enumerate() {
    let max_idx = (idx + WINDOW).min(short_indices.len());
    for end_idx in (idx + 3)..=max_idx {
      let j = short_indices[end_idx - 1];
      if j - i > WINDOW {
        break;
      }
      let window = &words[i..=j];
      if !window.iter().all(|w| w.len() <= 2) {
        continue;
      }
      let joined: String = window.concat();
      if is_callsign(&joined) {
        let score = score_callsign(&joined);
        candidates.push(Candidate { callsign: joined, start: i, end: j + 1, score });
      }
    }
  }

  candidates.sort_by(|a, b| {
    b.score.cmp(&a.score).then(b.callsign.len().cmp(&a.callsign.len()))
  });

  let mut selected: Vec<String> = Vec::new();
  let mut used = vec![false; words.len()];
  for candidate in candidates {
    if used[candidate.start..candidate.end].iter().any(|&u| u) {
      continue;
    }
    for slot in &mut used[candidate.start..candidate.end] {
      *slot = true;
    }
    selected.push(candidate.callsign);
  }
  selected
}

/// Regional-prefix and length heuristics, higher is more plausible.
fn score_callsign(callsign: &str) -> i32 {
  let mut score = 0;

  const RUSSIAN_PREFIXES: [&str; 10] = ["R", "RA", "RU", "RV", "RW", "RX", "RY", "RZ", "UA", "UB"];
  if RUSSIAN_PREFIXES.iter().any(|p| callsign.starts_with(p)) {
    score += 20;
  } else if callsign.starts_with("II") && callsign.len() >= 6 {
    score += 15;
  } else if callsign.starts_with('I') && callsign.len() >= 5 {
    score += 10;
  }

  match callsign.len() {
    5..=7 => score += 10,
    8 => score += 5,
    9.. => score -= 10,
    _ => {}
  }
  score
}

fn analyze_structure(words: &[&str], detections: &[Detection], has_callsign: bool) -> MessageStructure {
  let has_start = words.iter().any(|&w| w == "CQ" || w == "DE");
  let has_end = words.iter().any(|&w| w == "SK" || w == "AR" || w == "<SK>" || w == "<AR>");
  let has_separator = words.iter().any(|&w| w == "BT" || w == "<BT>");

  let probable_type = if detections.iter().any(|d| d.kind == CodeKind::ZCode) {
    MessageType::ProceduralCommand
  } else if detections.iter().any(|d| d.kind == CodeKind::QCode) {
    MessageType::OperationalMessage
  } else if has_callsign {
    MessageType::GeneralCommunication
  } else {
    MessageType::Unknown
  };

  MessageStructure { has_start, has_end, has_separator, has_callsign, probable_type }
}
