//! Position-preserving cask definitions
//!
//! A definition is read as an ordered list of stanzas, one per line that starts
//! with an identifier, each tagged with its block depth and the byte span of
//! its first literal value. Edits replace value spans only; every other byte
//! of the file comes through unchanged.
//!
//! ```text
//! cask "fine-tune" do          depth 0, opens block
//!   version "1.0.0"            depth 1  <- editable
//!   livecheck do               depth 1, opens block
//!     url :url                 depth 2  (ignored)
//!   end
//! end                          closes the cask block
//! ```

use crate::core::error::{ReleaseError, TapError, TapResult};
use std::ops::Range;

/// Fields the mutator may rewrite
pub const EDITABLE_FIELDS: [&str; 3] = ["version", "sha256", "url"];

/// One line that starts with an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
  pub key: String,

  /// Block depth the stanza sits at (1 = directly inside `cask ... do`)
  pub depth: usize,

  /// Byte offset of the line start
  pub start: usize,

  /// Span of the first value literal after the key, quotes included
  pub value: Option<Range<usize>>,

  /// For block openers: byte offset just past the closing `end` line
  pub block_end: Option<usize>,
}

/// A parsed definition and its original text
#[derive(Debug, Clone)]
pub struct CaskDocument {
  token: String,
  source: String,
  stanzas: Vec<Stanza>,

  /// Line start of the `end` closing the cask block
  closing_end: usize,
}

impl CaskDocument {
  /// Parse a definition
  ///
  /// Fails with `RecordParseError` when there is no `cask ... do` block or its
  /// `do`/`end` pairs do not balance.
  pub fn parse(token: &str, source: &str) -> TapResult<Self> {
    let mut stanzas: Vec<Stanza> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut closing_end = None;
    let mut offset = 0usize;

    for line in source.split_inclusive('\n') {
      let start = offset;
      offset += line.len();

      let code = code_part(line).trim();
      if code.is_empty() {
        continue;
      }

      if code == "end" || code.starts_with("end ") || code.starts_with("end.") {
        let Some(opener) = open.pop() else {
          return Err(parse_error(token, "end", "unbalanced `end`"));
        };
        stanzas[opener].block_end = Some(offset);
        depth -= 1;
        if depth == 0 && closing_end.is_none() {
          closing_end = Some(start);
        }
        continue;
      }

      let Some(key) = leading_identifier(code) else {
        continue;
      };
      if depth == 0 && key != "cask" {
        continue;
      }

      let indent = line.len() - line.trim_start().len();
      let key_at = start + indent;
      let value = value_span(source, key_at + key.len(), start + line.trim_end_matches(['\n', '\r']).len());

      stanzas.push(Stanza {
        key: key.to_string(),
        depth,
        start,
        value,
        block_end: None,
      });

      if opens_block(code) {
        open.push(stanzas.len() - 1);
        depth += 1;
      }
    }

    if !open.is_empty() {
      return Err(parse_error(token, "end", "block is never closed"));
    }
    if !stanzas.first().is_some_and(|s| s.key == "cask" && s.block_end.is_some()) {
      return Err(parse_error(token, "cask", "no `cask \"...\" do` block"));
    }
    let closing_end = closing_end.ok_or_else(|| parse_error(token, "cask", "no closing `end`"))?;

    Ok(Self {
      token: token.to_string(),
      source: source.to_string(),
      stanzas,
      closing_end,
    })
  }

  /// The single top-level stanza for `key`
  pub fn field(&self, key: &str) -> TapResult<&Stanza> {
    let mut hits = self.stanzas.iter().filter(|s| s.depth == 1 && s.key == key);
    let first = hits
      .next()
      .ok_or_else(|| parse_error(&self.token, key, "missing at the top level of the cask block"))?;
    let extra = hits.count();
    if extra > 0 {
      return Err(parse_error(
        &self.token,
        key,
        &format!("appears {} times at the top level", extra + 1),
      ));
    }
    if first.value.is_none() {
      return Err(parse_error(&self.token, key, "value is not a string or symbol literal"));
    }
    Ok(first)
  }

  /// Unquoted value of a top-level field, located strictly
  pub fn value(&self, key: &str) -> TapResult<String> {
    let stanza = self.field(key)?;
    Ok(stanza.value.clone().map(|span| unquote(&self.source[span])).unwrap_or_default())
  }

  /// Unquoted value of the first top-level stanza for `key`, if any
  pub fn first_value(&self, key: &str) -> Option<String> {
    self
      .stanzas
      .iter()
      .find(|s| s.depth == 1 && s.key == key)
      .and_then(|s| s.value.clone())
      .map(|span| unquote(&self.source[span]))
  }

  /// Whether some top-level stanza `key` exists
  pub fn has(&self, key: &str) -> bool {
    self.stanzas.iter().any(|s| s.depth == 1 && s.key == key)
  }

  /// A `postflight` block that already clears the quarantine attribute
  pub fn has_quarantine_stanza(&self) -> bool {
    self
      .stanzas
      .iter()
      .filter(|s| s.depth == 1 && s.key == "postflight")
      .any(|s| {
        let end = s.block_end.unwrap_or(s.start);
        self.source[s.start..end].contains("com.apple.quarantine")
      })
  }

  /// Render with the editable fields replaced and `insert` placed before the
  /// closing `end`
  ///
  /// Every field in `updates` must be locatable; nothing is rendered otherwise.
  pub fn render(&self, updates: &[(&str, &str)], insert: Option<&str>) -> TapResult<String> {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for (key, new_value) in updates {
      let stanza = self.field(key)?;
      if let Some(span) = &stanza.value {
        edits.push((span.clone(), format!("\"{}\"", new_value)));
      }
    }
    if let Some(text) = insert {
      let mut block = String::new();
      if !self.source[..self.closing_end].ends_with('\n') {
        block.push('\n');
      }
      block.push_str(text);
      edits.push((self.closing_end..self.closing_end, block));
    }

    edits.sort_by_key(|(span, _)| span.start);
    let mut out = String::with_capacity(self.source.len() + 256);
    let mut cursor = 0;
    for (span, text) in edits {
      out.push_str(&self.source[cursor..span.start]);
      out.push_str(&text);
      cursor = span.end;
    }
    out.push_str(&self.source[cursor..]);
    Ok(out)
  }
}

fn parse_error(token: &str, field: &str, reason: &str) -> TapError {
  ReleaseError::RecordParseError {
    token: token.to_string(),
    field: field.to_string(),
    reason: reason.to_string(),
  }
  .into()
}

/// Line content before any comment, ignoring `#` inside string literals
fn code_part(line: &str) -> &str {
  let mut quote: Option<char> = None;
  let mut escaped = false;
  for (i, c) in line.char_indices() {
    if let Some(q) = quote {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == q {
        quote = None;
      }
      continue;
    }
    match c {
      '"' | '\'' => quote = Some(c),
      '#' => return &line[..i],
      _ => {}
    }
  }
  line
}

fn leading_identifier(code: &str) -> Option<&str> {
  let end = code
    .char_indices()
    .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
    .map(|(i, _)| i)
    .unwrap_or(code.len());
  let ident = &code[..end];
  let first = ident.chars().next()?;
  // `foo:` is a hash key continuing the previous line, not a stanza
  if first.is_ascii_digit() || code[end..].starts_with(':') && !code[end..].starts_with("::") {
    return None;
  }
  Some(ident)
}

fn opens_block(code: &str) -> bool {
  let code = code.trim_end();
  let without_params = match code.strip_suffix('|') {
    Some(rest) => match rest.rfind('|') {
      Some(open) => rest[..open].trim_end(),
      None => code,
    },
    None => code,
  };
  if without_params == "do" || without_params.ends_with(" do") || without_params.ends_with(")do") {
    return true;
  }
  ["if ", "unless ", "case ", "while ", "until ", "def "]
    .iter()
    .any(|kw| code.starts_with(kw))
    || code == "begin"
}

/// Span of the first string or symbol literal in `source[from..line_end]`
fn value_span(source: &str, from: usize, line_end: usize) -> Option<Range<usize>> {
  let rest = &source[from..line_end];
  let skipped = rest.len() - rest.trim_start_matches([' ', '\t', '(']).len();
  let at = from + skipped;
  let bytes = source.as_bytes();
  if at >= line_end || skipped == 0 {
    return None;
  }

  match bytes[at] {
    b'"' | b'\'' => {
      let quote = bytes[at];
      let mut i = at + 1;
      while i < line_end {
        match bytes[i] {
          b'\\' => i += 2,
          b if b == quote => return Some(at..i + 1),
          _ => i += 1,
        }
      }
      None
    }
    b':' => {
      let len = source[at + 1..line_end]
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line_end - at - 1);
      (len > 0).then(|| at..at + 1 + len)
    }
    _ => None,
  }
}

fn unquote(literal: &str) -> String {
  literal
    .strip_prefix(['"', '\''])
    .and_then(|s| s.strip_suffix(['"', '\'']))
    .unwrap_or(literal)
    .to_string()
}
