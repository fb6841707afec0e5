//! Weight frame decoding for truck-scale indicators.
//!
//! Indicators stream free-form ASCII at whatever rate they like, and the
//! serial layer hands us chunks that may or may not line up with a reading.
//! Common shapes seen in the field:
//! - **Status prefixed**: `ST,GS,    1200,kg` / `ST,GS,+  0.500kg`
//! - **Number + unit**: `  1234.5 kg` / `+001234.5 KG`
//! - **Keyword**: `NET 1234.5` / `GROSS 1234.5`
//! - **Bare**: `1234.5`
//!
//! Decoding walks [`FRAME_RULES`] in order and returns the first hit. Richer
//! formats sit earlier in the table so a trailing checksum or sequence digit
//! never wins over a proper status frame in the same chunk.
//!
//! A chunk that yields nothing is normal (partial or garbled frame) and is
//! reported as `None`, never as an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Status/mode tokens that introduce a status-prefixed frame.
const STATUS_TOKENS: &[&str] = &["ST", "GS", "NET", "GROSS"];

/// Keywords that may be followed directly by the weight.
const KEYWORD_TOKENS: &[&str] = &["NET", "GROSS"];

/// Unit tokens accepted after a bare number. `KGS` is covered by the `KG`
/// prefix.
const UNIT_TOKENS: &[&str] = &["KG", "G", "LB", "T"];

/// One extraction strategy: finds the numeric text of a weight in a
/// normalized (uppercased, trimmed) frame.
pub struct FrameRule {
    pub name: &'static str,
    extract: fn(&str) -> Option<&str>,
    /// Whether a negative reading is still a valid match. Only the generic
    /// fallback rejects them; indicators with a status field sign tare
    /// offsets, which we fold away with `abs`.
    accepts_negative: bool,
}

/// Extraction rules in precedence order.
pub const FRAME_RULES: &[FrameRule] = &[
    FrameRule {
        name: "status_prefixed",
        extract: status_prefixed,
        accepts_negative: true,
    },
    FrameRule {
        name: "number_with_unit",
        extract: number_with_unit,
        accepts_negative: true,
    },
    FrameRule {
        name: "keyword_number",
        extract: keyword_number,
        accepts_negative: true,
    },
    FrameRule {
        name: "bare_number",
        extract: first_number,
        accepts_negative: false,
    },
];

/// A successful decode: the normalized weight plus the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMatch {
    pub rule: &'static str,
    pub value: f64,
}

/// Decode a raw chunk into a non-negative weight.
pub fn parse_frame(raw: &str) -> Option<f64> {
    match_frame(raw).map(|m| m.value)
}

/// Like [`parse_frame`] but also reports which rule matched.
pub fn match_frame(raw: &str) -> Option<FrameMatch> {
    let normalized = raw.trim().to_uppercase();
    if normalized.is_empty() {
        return None;
    }

    for rule in FRAME_RULES {
        let Some(text) = (rule.extract)(&normalized) else {
            continue;
        };
        let Ok(value) = text.parse::<f64>() else {
            continue;
        };
        if !value.is_finite() || (!rule.accepts_negative && value < 0.0) {
            continue;
        }
        return Some(FrameMatch {
            rule: rule.name,
            value: value.abs(),
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// `<STATUS> ... <±NUMBER> [UNIT]`: the first number after a status token,
/// staying on the token's line.
fn status_prefixed(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    for (_, token_end) in token_occurrences(s, STATUS_TOKENS) {
        let mut i = token_end;
        while i < bytes.len() && !is_line_break(bytes[i]) {
            if let Some(end) = number_end(bytes, i) {
                return Some(&s[i..end]);
            }
            i += 1;
        }
    }
    None
}

/// `<±NUMBER><UNIT>` with optional whitespace between the two.
fn number_with_unit(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    for start in 0..bytes.len() {
        let Some(end) = number_end(bytes, start) else {
            continue;
        };
        let rest = &s[skip_whitespace(bytes, end)..];
        if UNIT_TOKENS.iter().any(|unit| rest.starts_with(unit)) {
            return Some(&s[start..end]);
        }
    }
    None
}

/// `<NET|GROSS> <±NUMBER>`, unit not required.
fn keyword_number(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    for (_, token_end) in token_occurrences(s, KEYWORD_TOKENS) {
        let start = skip_whitespace(bytes, token_end);
        if let Some(end) = number_end(bytes, start) {
            return Some(&s[start..end]);
        }
    }
    None
}

/// The first signed decimal anywhere in the frame.
fn first_number(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    (0..bytes.len()).find_map(|start| number_end(bytes, start).map(|end| &s[start..end]))
}

// ---------------------------------------------------------------------------
// Scanning helpers
// ---------------------------------------------------------------------------

/// If a decimal number `[+-]?digits(.digits)?` starts at `start`, return the
/// index one past its end. A trailing dot with no fraction digits is kept,
/// matching how indicators print `1200.`.
fn number_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    if matches!(bytes.get(i), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let digits_start = i;
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
    }
    Some(i)
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn is_line_break(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// All `(start, end)` spans where any of `tokens` occurs, leftmost first.
fn token_occurrences<'a>(
    s: &'a str,
    tokens: &'a [&'a str],
) -> impl Iterator<Item = (usize, usize)> + 'a {
    (0..s.len()).filter_map(move |start| {
        let rest = s.get(start..)?;
        tokens
            .iter()
            .find(|token| rest.starts_with(*token))
            .map(|token| (start, start + token.len()))
    })
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// How raw serial text is cut into frames before decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Decode every chunk exactly as the port delivered it.
    #[default]
    Chunk,
    /// Buffer chunks and decode complete newline-terminated lines.
    Line,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Framing::Chunk => "chunk",
            Framing::Line => "line",
        })
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunk" => Ok(Framing::Chunk),
            "line" => Ok(Framing::Line),
            other => Err(format!("unknown framing: {other}")),
        }
    }
}

/// Upper bound for an unterminated line before it is discarded.
const MAX_LINE_BUFFER: usize = 1024;

/// Cuts a chunk stream into frames according to a [`Framing`].
#[derive(Debug, Default)]
pub struct Framer {
    framing: Framing,
    line_buf: String,
}

impl Framer {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            line_buf: String::new(),
        }
    }

    /// Feed one chunk and collect the frames it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        match self.framing {
            Framing::Chunk => vec![chunk.to_string()],
            Framing::Line => {
                self.line_buf.push_str(chunk);
                let mut frames = Vec::new();
                while let Some(pos) = self.line_buf.find('\n') {
                    let line: String = self.line_buf.drain(..=pos).collect();
                    frames.push(line);
                }
                // Prevent line_buf from growing unbounded on a device that
                // never sends a terminator.
                if self.line_buf.len() > MAX_LINE_BUFFER {
                    self.line_buf.clear();
                }
                frames
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
