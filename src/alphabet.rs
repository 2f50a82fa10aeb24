//! Morse lookup tables and the letter decoder.
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Placeholder emitted for a dot/dash pattern absent from every table.
pub const UNKNOWN_MARK: char = '□';

/// One segmented token: a letter's dot/dash pattern, or a word boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LetterToken {
  Letter(String),
  WordBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
  Latin,
  Cyrillic,
}

/// Prosigns are run-together combinations keyed without inter-letter
/// spacing. They are checked BEFORE the per-language tables because
/// several collide with punctuation codes (e.g. `.-.-.` is both `<AR>`
/// and `+`).
///
/// The original table also mapped `..-.` to `<INT>`, which shadows the
/// letter F in every text; that entry is deliberately absent.
pub static PROSIGNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
  HashMap::from([
    (".-.-.", "<AR>"),    // end of message (A+R)
    ("...-.-", "<SK>"),   // end of contact (S+K)
    ("-...-", "<BT>"),    // section separator (B+T)
    ("-.-.-", "<CT>"),    // start of transmission
    ("-.--.", "<KN>"),    // go ahead, named station only (K+N)
    (".-...", "<AS>"),    // wait (A+S)
    ("........", "<HH>"), // error, eight dots
    ("...-.", "<SN>"),    // understood (S+N)
  ])
});

pub static LATIN: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
  HashMap::from([
    (".-", "A"), ("-...", "B"), ("-.-.", "C"), ("-..", "D"), (".", "E"),
    ("..-.", "F"), ("--.", "G"), ("....", "H"), ("..", "I"), (".---", "J"),
    ("-.-", "K"), (".-..", "L"), ("--", "M"), ("-.", "N"), ("---", "O"),
    (".--.", "P"), ("--.-", "Q"), (".-.", "R"), ("...", "S"), ("-", "T"),
    ("..-", "U"), ("...-", "V"), (".--", "W"), ("-..-", "X"), ("-.--", "Y"),
    ("--..", "Z"),
    ("-----", "0"), (".----", "1"), ("..---", "2"), ("...--", "3"),
    ("....-", "4"), (".....", "5"), ("-....", "6"), ("--...", "7"),
    ("---..", "8"), ("----.", "9"),
    (".-.-.-", "."), ("--..--", ","), ("..--..", "?"), (".----.", "'"),
    ("-.-.--", "!"), ("-..-.", "/"), ("-.--.", "("), ("-.--.-", ")"),
    (".-...", "&"), ("---...", ":"), ("-.-.-.", ";"), ("-...-", "="),
    (".-.-.", "+"), ("-....-", "-"), ("..--.-", "_"), (".-..-.", "\""),
    ("...-..-", "$"), (".--.-.", "@"),
  ])
});

/// The source table lists `..-.` twice, first as Ф and again as Э, and
/// dict-literal construction lets the later entry win, so the source
/// actually decodes `..-.` as Э. This table deliberately keeps Ф
/// (pairing the code with Latin F) and drops the Э reading; the
/// tie-break is documented in DESIGN.md.
pub static CYRILLIC: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
  HashMap::from([
    (".-", "А"), ("-...", "Б"), (".--", "В"), ("--.", "Г"), ("-..", "Д"),
    (".", "Е"), ("...-", "Ж"), ("--..", "З"), ("..", "И"), (".---", "Й"),
    ("-.-", "К"), (".-..", "Л"), ("--", "М"), ("-.", "Н"), ("---", "О"),
    (".--.", "П"), (".-.", "Р"), ("...", "С"), ("-", "Т"), ("..-", "У"),
    ("..-.", "Ф"), ("....", "Х"), ("-.-.", "Ц"), ("---.", "Ч"), ("----", "Ш"),
    ("--.-", "Щ"), ("-.--", "Ы"), ("-..-", "Ь"), ("..--", "Ю"), (".-.-", "Я"),
    ("-----", "0"), (".----", "1"), ("..---", "2"), ("...--", "3"),
    ("....-", "4"), (".....", "5"), ("-....", "6"), ("--...", "7"),
    ("---..", "8"), ("----.", "9"),
    (".-.-.-", "."), ("--..--", ","), ("..--..", "?"), (".----.", "'"),
    ("-.-.--", "!"), ("-..-.", "/"), ("-.--.", "("), ("-.--.-", ")"),
    ("---...", ":"), ("-.-.-.", ";"), ("-...-", "="),
  ])
});

/// Decode segmented letter tokens into text.
///
/// Decision order per token: word break (single space, never doubled),
/// prosign table, language table, `□`.
pub fn decode_tokens(tokens: &[LetterToken], language: Language) -> String {
  let table = match language {
    Language::Latin => &*LATIN,
    Language::Cyrillic => &*CYRILLIC,
  };

  let mut out = String::new();
  for token in tokens {
    match token {
      LetterToken::WordBreak => {
        if !out.is_empty() && !out.ends_with(' ') {
          out.push(' ');
        }
      }
      LetterToken::Letter(pattern) => {
        if let Some(prosign) = PROSIGNS.get(pattern.as_str()) {
          out.push_str(prosign);
        } else if let Some(ch) = table.get(pattern.as_str()) {
          out.push_str(ch);
        } else {
          out.push(UNKNOWN_MARK);
        }
      }
    }
  }
  out
}

/// Join tokens back into a human-readable Morse string, e.g.
/// `-.-. --.- / -.. .` for "CQ DE".
pub fn tokens_to_morse_string(tokens: &[LetterToken]) -> String {
  tokens
    .iter()
    .map(|t| match t {
      LetterToken::Letter(p) => p.as_str(),
      LetterToken::WordBreak => "/",
    })
    .collect::<Vec<_>>()
    .join(" ")
}
