//! Diagnostics.
//!
//! All errors are fatal: a pass returns `Err(Diag)` the moment it hits one,
//! and the driver reports-then-exits with status 1. Lexical/syntactic/
//! semantic diagnostics carry a byte offset into the source buffer and are
//! rendered with the `<filename>:<line>: <source-line>` + caret format;
//! I/O and internal errors are plain lines.

use std::fmt;

pub type Result<T> = std::result::Result<T, Diag>;

#[derive(Debug)]
pub enum Diag {
  Io(String),
  Lexical { at: u32, message: String },
  Syntax { at: u32, message: String },
  Semantic { at: u32, message: String },
  Internal(String),
}

impl Diag {
  pub(crate) fn lexical(at: u32, message: impl Into<String>) -> Self {
    Diag::Lexical { at, message: message.into() }
  }
  pub(crate) fn syntax(at: u32, message: impl Into<String>) -> Self {
    Diag::Syntax { at, message: message.into() }
  }
  pub(crate) fn semantic(at: u32, message: impl Into<String>) -> Self {
    Diag::Semantic { at, message: message.into() }
  }
  pub(crate) fn internal(message: impl Into<String>) -> Self {
    Diag::Internal(message.into())
  }

  /// Render this diagnostic against `filename`/`src` for display on stderr.
  #[must_use] pub fn render(&self, filename: &str, src: &[u8]) -> String {
    match *self {
      Diag::Io(ref m) => m.clone(),
      Diag::Internal(ref m) => format!("internal compiler error: {m}"),
      Diag::Lexical { at, ref message }
      | Diag::Syntax { at, ref message }
      | Diag::Semantic { at, ref message } => render_at(filename, src, at, message),
    }
  }
}

impl fmt::Display for Diag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Diag::Io(m) | Diag::Internal(m) => f.write_str(m),
      Diag::Lexical { message, .. } | Diag::Syntax { message, .. } | Diag::Semantic { message, .. } =>
        f.write_str(message),
    }
  }
}

impl std::error::Error for Diag {}

impl From<std::io::Error> for Diag {
  fn from(e: std::io::Error) -> Self { Diag::Io(e.to_string()) }
}

/// Find the line containing byte offset `at` and format the two-line
/// `<filename>:<line>: <source>` / caret diagnostic.
fn render_at(filename: &str, src: &[u8], at: u32, message: &str) -> String {
  let at = (at as usize).min(src.len().saturating_sub(1));
  let line_start = src[..at].iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
  let line_end = src[at..].iter().position(|&b| b == b'\n' || b == 0)
    .map_or(src.len(), |i| at + i);
  let line_no = src[..line_start].iter().filter(|&&b| b == b'\n').count() + 1;
  let col = at - line_start;
  let line_text = String::from_utf8_lossy(&src[line_start..line_end]);
  let prefix = format!("{filename}:{line_no}: ");
  let caret_indent = " ".repeat(prefix.len() + col);
  format!("{prefix}{line_text}\n{caret_indent}^ {message}")
}
