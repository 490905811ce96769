//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics point at the offending byte with a caret placed under the
//! source line. The source buffer is always passed in explicitly; nothing is
//! kept in global state.

use std::fmt;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Broad classification of a located compilation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  MalformedToken,
  Syntax,
  Declaration,
  Binding,
  Arity,
  Type,
  LValue,
}

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// A fatal error in the program being compiled.
  #[snafu(display("ERROR: {message} @{loc} ({line},{column}):\n{source_line}\n{marker}"))]
  WithLocation {
    kind: ErrorKind,
    message: String,
    loc: usize,
    line: usize,
    column: usize,
    source_line: String,
    marker: String,
  },
  /// A broken invariant inside the compiler itself.
  #[snafu(display("INTERNAL ERROR: {message}"))]
  Internal { message: String },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, kind: ErrorKind, loc: usize, message: impl Into<String>) -> Self {
    let location = Location::resolve(source, loc);
    Self::WithLocation {
      kind,
      message: message.into(),
      loc,
      line: location.line,
      column: location.column,
      marker: location.marker(source),
      source_line: location.text(source).to_string(),
    }
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  pub fn kind(&self) -> Option<ErrorKind> {
    match self {
      Self::WithLocation { kind, .. } => Some(*kind),
      Self::Internal { .. } => None,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      Self::WithLocation { message, .. } | Self::Internal { message } => message,
    }
  }

  pub fn loc(&self) -> Option<usize> {
    match self {
      Self::WithLocation { loc, .. } => Some(*loc),
      Self::Internal { .. } => None,
    }
  }
}

/// A non-fatal diagnostic. Compilation carries on after one is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
  pub message: String,
  pub loc: usize,
  pub line: usize,
  pub column: usize,
}

impl Warning {
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let location = Location::resolve(source, loc);
    let warning = Self {
      message: message.into(),
      loc,
      line: location.line,
      column: location.column,
    };
    log::warn!("{warning}");
    warning
  }
}

impl fmt::Display for Warning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "WARNING: {} @{} ({},{})",
      self.message, self.loc, self.line, self.column
    )
  }
}

/// Line/column view of a byte offset. Lines are 1-based, columns count the
/// bytes preceding the offset on its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
  line: usize,
  column: usize,
  line_start: usize,
  loc: usize,
}

impl Location {
  fn resolve(source: &str, loc: usize) -> Self {
    let safe_loc = loc.min(source.len());
    let before = &source.as_bytes()[..safe_loc];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
      .iter()
      .rposition(|&b| b == b'\n')
      .map_or(0, |newline| newline + 1);
    Self {
      line,
      column: safe_loc - line_start,
      line_start,
      loc: safe_loc,
    }
  }

  fn text<'a>(&self, source: &'a str) -> &'a str {
    let rest = &source[self.line_start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    rest[..end].trim_end_matches('\r')
  }

  /// Caret line. Tabs are echoed so the caret lines up under tabbed code.
  fn marker(&self, source: &str) -> String {
    let mut marker: String = source.as_bytes()[self.line_start..self.loc]
      .iter()
      .map(|&b| if b == b'\t' { '\t' } else { ' ' })
      .collect();
    marker.push('^');
    marker
  }
}
