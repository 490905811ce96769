//! Lexical analysis: turns the raw source text into a vector of tokens.
//!
//! The tokenizer knows nothing about grammar. Whitespace characters are
//! emitted as tokens of their own and the parser decides where to skip them.
//! Two-character operators are matched with one byte of lookahead.

use std::fmt;

use crate::error::{CompileError, CompileResult, ErrorKind};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  // Whitespace and separators
  Space,
  Tab,
  Newline,
  Comma,

  // Enclosures
  OpenParen,
  CloseParen,
  OpenBracket,
  CloseBracket,
  OpenBrace,
  CloseBrace,

  // Operators
  At,
  Bang,
  BangEquals,
  Tilde,
  Caret,
  Plus,
  Dash,
  Star,
  Slash,
  Percent,
  Equals,
  DoubleEquals,
  LeftAngle,
  LeftAngleEquals,
  DoubleLeftAngle,
  RightAngle,
  RightAngleEquals,
  DoubleRightAngle,
  Bar,
  DoubleBar,
  Ampersand,
  DoubleAmpersand,

  // Literals
  Integer,
  Char,
  Boolean,
  String,

  // Keywords
  Sizeof,
  If,
  Else,
  While,
  Return,
  Proc,
  Extern,
  Etcetera,

  Name,
}

impl TokenKind {
  pub fn is_whitespace(self) -> bool {
    matches!(self, Self::Space | Self::Tab | Self::Newline)
  }

  pub fn is_operator(self) -> bool {
    matches!(
      self,
      Self::At
        | Self::Bang
        | Self::BangEquals
        | Self::Tilde
        | Self::Caret
        | Self::Plus
        | Self::Dash
        | Self::Star
        | Self::Slash
        | Self::Percent
        | Self::Equals
        | Self::DoubleEquals
        | Self::LeftAngle
        | Self::LeftAngleEquals
        | Self::DoubleLeftAngle
        | Self::RightAngle
        | Self::RightAngleEquals
        | Self::DoubleRightAngle
        | Self::Bar
        | Self::DoubleBar
        | Self::Ampersand
        | Self::DoubleAmpersand
    )
  }

  /// Fixed spelling for punctuation and operators.
  pub fn symbol(self) -> Option<&'static str> {
    let text = match self {
      Self::Space => " ",
      Self::Tab => "\t",
      Self::Newline => "\n",
      Self::Comma => ",",
      Self::OpenParen => "(",
      Self::CloseParen => ")",
      Self::OpenBracket => "[",
      Self::CloseBracket => "]",
      Self::OpenBrace => "{",
      Self::CloseBrace => "}",
      Self::At => "@",
      Self::Bang => "!",
      Self::BangEquals => "!=",
      Self::Tilde => "~",
      Self::Caret => "^",
      Self::Plus => "+",
      Self::Dash => "-",
      Self::Star => "*",
      Self::Slash => "/",
      Self::Percent => "%",
      Self::Equals => "=",
      Self::DoubleEquals => "==",
      Self::LeftAngle => "<",
      Self::LeftAngleEquals => "<=",
      Self::DoubleLeftAngle => "<<",
      Self::RightAngle => ">",
      Self::RightAngleEquals => ">=",
      Self::DoubleRightAngle => ">>",
      Self::Bar => "|",
      Self::DoubleBar => "||",
      Self::Ampersand => "&",
      Self::DoubleAmpersand => "&&",
      _ => return None,
    };
    Some(text)
  }

  fn keyword(text: &str) -> Option<Self> {
    let kind = match text {
      "true" | "false" => Self::Boolean,
      "sizeof" => Self::Sizeof,
      "if" => Self::If,
      "else" => Self::Else,
      "while" => Self::While,
      "return" => Self::Return,
      "proc" => Self::Proc,
      "extern" => Self::Extern,
      "etcetera" => Self::Etcetera,
      _ => return None,
    };
    Some(kind)
  }
}

/// A lexeme together with where it started in the source.
///
/// For character and string literals `text` holds the decoded contents,
/// without quotes and with escapes resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  pub loc: usize,
}

impl Token {
  pub fn new(kind: TokenKind, loc: usize, text: impl Into<String>) -> Self {
    Self {
      kind,
      text: text.into(),
      loc,
    }
  }

  /// Build a token whose text is implied by its kind.
  pub fn punctuator(kind: TokenKind, loc: usize) -> Self {
    Self::new(kind, loc, kind.symbol().unwrap_or_default())
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({:?}) @{}", self.text.escape_debug(), self.kind, self.loc)
  }
}

/// Lex the whole input into a flat vector of tokens.
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
  let tokens = Lexer::new(source).scan()?;
  log::debug!("scanned {} tokens", tokens.len());
  Ok(tokens)
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>) -> String {
  match token {
    Some(t) if t.kind.is_whitespace() => format!("{:?}", t.kind),
    Some(t) => t.text.clone(),
    None => "EOF".to_string(),
  }
}

struct Lexer<'a> {
  source: &'a str,
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Lexer<'a> {
  fn new(source: &'a str) -> Self {
    Self {
      source,
      bytes: source.as_bytes(),
      pos: 0,
    }
  }

  fn scan(mut self) -> CompileResult<Vec<Token>> {
    let mut tokens = Vec::new();

    while let Some(c) = self.peek() {
      let start = self.pos;

      let single = match c {
        b',' => Some(TokenKind::Comma),
        b' ' => Some(TokenKind::Space),
        b'\t' => Some(TokenKind::Tab),
        b'\n' | b'\r' => Some(TokenKind::Newline),
        b'(' => Some(TokenKind::OpenParen),
        b')' => Some(TokenKind::CloseParen),
        b'[' => Some(TokenKind::OpenBracket),
        b']' => Some(TokenKind::CloseBracket),
        b'{' => Some(TokenKind::OpenBrace),
        b'}' => Some(TokenKind::CloseBrace),
        b'@' => Some(TokenKind::At),
        b'~' => Some(TokenKind::Tilde),
        b'^' => Some(TokenKind::Caret),
        b'+' => Some(TokenKind::Plus),
        b'-' => Some(TokenKind::Dash),
        b'*' => Some(TokenKind::Star),
        b'/' => Some(TokenKind::Slash),
        b'%' => Some(TokenKind::Percent),
        _ => None,
      };
      if let Some(kind) = single {
        self.pos += 1;
        tokens.push(Token::punctuator(kind, start));
        continue;
      }

      let next = self.bytes.get(start + 1).copied();
      let operator = match (c, next) {
        (b'!', Some(b'=')) => Some(TokenKind::BangEquals),
        (b'!', _) => Some(TokenKind::Bang),
        (b'=', Some(b'=')) => Some(TokenKind::DoubleEquals),
        (b'=', _) => Some(TokenKind::Equals),
        (b'<', Some(b'=')) => Some(TokenKind::LeftAngleEquals),
        (b'<', Some(b'<')) => Some(TokenKind::DoubleLeftAngle),
        (b'<', _) => Some(TokenKind::LeftAngle),
        (b'>', Some(b'=')) => Some(TokenKind::RightAngleEquals),
        (b'>', Some(b'>')) => Some(TokenKind::DoubleRightAngle),
        (b'>', _) => Some(TokenKind::RightAngle),
        (b'|', Some(b'|')) => Some(TokenKind::DoubleBar),
        (b'|', _) => Some(TokenKind::Bar),
        (b'&', Some(b'&')) => Some(TokenKind::DoubleAmpersand),
        (b'&', _) => Some(TokenKind::Ampersand),
        _ => None,
      };
      if let Some(kind) = operator {
        self.pos += kind.symbol().map_or(1, str::len);
        tokens.push(Token::punctuator(kind, start));
        continue;
      }

      match c {
        b'#' => self.skip_comment()?,
        b'0'..=b'9' => tokens.push(self.scan_integer()?),
        b'\'' => tokens.push(self.scan_char_literal()?),
        b'"' => tokens.push(self.scan_string_literal()?),
        c if c.is_ascii_alphabetic() || c == b'_' => tokens.push(self.scan_name()),
        _ => {
          let invalid = self.source[start..].chars().next().unwrap_or('\0');
          return Err(self.error(start, format!("Malformed token: '{}'", invalid.escape_debug())));
        }
      }
    }

    Ok(tokens)
  }

  fn peek(&self) -> Option<u8> {
    self.bytes.get(self.pos).copied()
  }

  fn error(&self, loc: usize, message: impl Into<String>) -> CompileError {
    CompileError::at(self.source, ErrorKind::MalformedToken, loc, message)
  }

  /// Comments run up to the end of the line; the newline itself is kept.
  fn skip_comment(&mut self) -> CompileResult<()> {
    let start = self.pos;
    match self.bytes[start..].iter().position(|&b| b == b'\n') {
      Some(len) => {
        self.pos = start + len;
        log::trace!("comment scanned from @{start} to @{}", self.pos);
        Ok(())
      }
      None => Err(self.error(self.bytes.len(), "Input ended mid-comment")),
    }
  }

  fn scan_integer(&mut self) -> CompileResult<Token> {
    let start = self.pos;
    while let Some(c) = self.peek() {
      if c.is_ascii_digit() {
        self.pos += 1;
      } else if c.is_ascii_alphabetic() {
        return Err(self.error(self.pos, "Malformed integer (invalid digit)"));
      } else {
        break;
      }
    }
    Ok(Token::new(TokenKind::Integer, start, &self.source[start..self.pos]))
  }

  fn scan_name(&mut self) -> Token {
    let start = self.pos;
    while let Some(c) = self.peek()
      && (c.is_ascii_alphanumeric() || c == b'_')
    {
      self.pos += 1;
    }
    let text = &self.source[start..self.pos];
    let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Name);
    Token::new(kind, start, text)
  }

  fn scan_char_literal(&mut self) -> CompileResult<Token> {
    let start = self.pos;
    self.pos += 1;
    let value = self.scan_char(start, "Quoted character incomplete")?;
    if self.peek() != Some(b'\'') {
      return Err(self.error(start, "Quoted character incomplete"));
    }
    self.pos += 1;
    Ok(Token::new(TokenKind::Char, start, char::from(value).to_string()))
  }

  fn scan_string_literal(&mut self) -> CompileResult<Token> {
    let start = self.pos;
    self.pos += 1;
    let mut text = Vec::new();
    loop {
      if self.peek() == Some(b'"') {
        self.pos += 1;
        break;
      }
      text.push(self.scan_char(start, "String literal incomplete")?);
    }
    let text = String::from_utf8_lossy(&text).into_owned();
    Ok(Token::new(TokenKind::String, start, text))
  }

  /// Consume one literal character, resolving a backslash escape.
  fn scan_char(&mut self, literal_start: usize, incomplete: &str) -> CompileResult<u8> {
    let Some(c) = self.peek() else {
      return Err(self.error(literal_start, incomplete));
    };
    self.pos += 1;
    if c != b'\\' {
      return Ok(c);
    }

    let Some(escaped) = self.peek() else {
      return Err(self.error(
        self.pos,
        "Incomplete escaped-character sequence at end of input",
      ));
    };
    let value = match escaped {
      b'0' => 0x00,
      b'a' => 0x07,
      b'b' => 0x08,
      b'e' => 0x1b,
      b'f' => 0x0c,
      b'n' => 0x0a,
      b'r' => 0x0d,
      b't' => 0x09,
      b'v' => 0x0b,
      b'\\' | b'\'' | b'"' => escaped,
      _ => {
        let shown = self.source[self.pos..].chars().next().unwrap_or('\0');
        return Err(self.error(
          self.pos,
          format!("Invalid escape character: {}", shown.escape_debug()),
        ));
      }
    };
    self.pos += 1;
    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source)
      .unwrap_or_else(|e| panic!("{e}"))
      .into_iter()
      .map(|t| t.kind)
      .collect()
  }

  #[test]
  fn simple_operation() {
    let tokens = tokenize("(+ 1 2)").unwrap();
    let summary: Vec<_> = tokens.iter().map(|t| (t.kind, t.text.as_str(), t.loc)).collect();
    assert_eq!(
      summary,
      vec![
        (TokenKind::OpenParen, "(", 0),
        (TokenKind::Plus, "+", 1),
        (TokenKind::Space, " ", 2),
        (TokenKind::Integer, "1", 3),
        (TokenKind::Space, " ", 4),
        (TokenKind::Integer, "2", 5),
        (TokenKind::CloseParen, ")", 6),
      ]
    );
  }

  #[test]
  fn two_character_operators_use_lookahead() {
    use TokenKind::*;
    assert_eq!(
      kinds("!= == <= << >= >> || &&"),
      vec![
        BangEquals,
        Space,
        DoubleEquals,
        Space,
        LeftAngleEquals,
        Space,
        DoubleLeftAngle,
        Space,
        RightAngleEquals,
        Space,
        DoubleRightAngle,
        Space,
        DoubleBar,
        Space,
        DoubleAmpersand,
      ]
    );
    assert_eq!(kinds("!x"), vec![Bang, Name]);
    assert_eq!(kinds("<-"), vec![LeftAngle, Dash]);
    assert_eq!(kinds("|&"), vec![Bar, Ampersand]);
    assert_eq!(kinds("="), vec![Equals]);
  }

  #[test]
  fn single_character_positions_are_exact() {
    let tokens = tokenize("a|b").unwrap();
    assert_eq!(tokens[1].kind, TokenKind::Bar);
    assert_eq!(tokens[1].loc, 1);
  }

  #[test]
  fn keywords_and_names() {
    use TokenKind::*;
    assert_eq!(
      kinds("if else while return proc extern etcetera sizeof true false int x_1"),
      vec![
        If, Space, Else, Space, While, Space, Return, Space, Proc, Space, Extern, Space, Etcetera,
        Space, Sizeof, Space, Boolean, Space, Boolean, Space, Name, Space, Name,
      ]
    );
  }

  #[test]
  fn comments_produce_no_token() {
    use TokenKind::*;
    assert_eq!(kinds("1 # the rest (is ignored)\n2"), vec![Integer, Space, Newline, Integer]);
  }

  #[test]
  fn unterminated_comment_is_malformed() {
    let err = tokenize("1 # no newline").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MalformedToken));
  }

  #[test]
  fn malformed_integer() {
    let err = tokenize("(+ 12ab 1)").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MalformedToken));
    assert_eq!(err.loc(), Some(5));
  }

  #[test]
  fn integer_may_be_followed_by_underscore_name() {
    use TokenKind::*;
    assert_eq!(kinds("12_a"), vec![Integer, Name]);
  }

  #[test]
  fn character_literals_decode_escapes() {
    let tokens = tokenize(r"'a' '\n' '\0' '\'' '\\'").unwrap();
    let chars: Vec<_> = tokens
      .iter()
      .filter(|t| t.kind == TokenKind::Char)
      .map(|t| t.text.clone())
      .collect();
    assert_eq!(chars, vec!["a", "\n", "\0", "'", "\\"]);
    assert_eq!(tokens[0].loc, 0);
  }

  #[test]
  fn invalid_escape_is_rejected() {
    let err = tokenize(r"'\q'").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MalformedToken));
    assert_eq!(err.loc(), Some(2));
    assert!(err.message().contains("Invalid escape"));
  }

  #[test]
  fn unterminated_character_literal() {
    assert!(tokenize("'ab'").is_err());
    assert!(tokenize("'a").is_err());
  }

  #[test]
  fn string_literals() {
    let tokens = tokenize(r#""hi\t\"there\"""#).unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].text, "hi\t\"there\"");
  }

  #[test]
  fn unterminated_string_points_at_opening_quote() {
    let err = tokenize("x \"abc").unwrap_err();
    assert_eq!(err.loc(), Some(2));
  }

  #[test]
  fn unknown_character() {
    let err = tokenize("(+ 1 $)").unwrap_err();
    assert_eq!(err.loc(), Some(5));
    assert!(err.message().contains('$'));
  }
}
