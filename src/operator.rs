//! Operator identities and their resolution from a token and operand count.
//!
//! The parser records only the token in operator position. The same token
//! can name different operators depending on how many operands follow it:
//! `(- x)` negates while `(- x y)` subtracts, `(* p)` dereferences while
//! `(* x y)` multiplies. Resolution happens once, in the binder.

use std::fmt;

use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::tokenizer::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
  Addition,
  Subtraction,
  Negation,
  Multiplication,
  Dereference,
  Division,
  Modulus,
  Assignment,
  Equality,
  NotEquality,
  LessThan,
  LessThanEquals,
  GreaterThan,
  GreaterThanEquals,
  LogicalAnd,
  LogicalOr,
  LogicalNot,
  BitwiseAnd,
  BitwiseOr,
  BitwiseXor,
  BitwiseNot,
  ShiftLeft,
  ShiftRight,
  Reference,
  /// Procedure call; `callee` indexes `Program::procedures` once bound.
  Call { callee: Option<usize> },
}

impl Operator {
  /// Whether an operation with this operator can stand as an l-value.
  pub fn has_reference(self) -> bool {
    matches!(self, Self::Dereference)
  }

  pub fn description(self) -> &'static str {
    match self {
      Self::Addition => "addition",
      Self::Subtraction => "subtraction",
      Self::Negation => "negation",
      Self::Multiplication => "multiplication",
      Self::Dereference => "dereference",
      Self::Division => "division",
      Self::Modulus => "modulus",
      Self::Assignment => "assignment",
      Self::Equality => "equality",
      Self::NotEquality => "not-equality",
      Self::LessThan => "less-than",
      Self::LessThanEquals => "less-than-or-equals",
      Self::GreaterThan => "greater-than",
      Self::GreaterThanEquals => "greater-than-or-equals",
      Self::LogicalAnd => "logical and",
      Self::LogicalOr => "logical or",
      Self::LogicalNot => "logical not",
      Self::BitwiseAnd => "bitwise and",
      Self::BitwiseOr => "bitwise or",
      Self::BitwiseXor => "bitwise xor",
      Self::BitwiseNot => "bitwise not",
      Self::ShiftLeft => "shift left",
      Self::ShiftRight => "shift right",
      Self::Reference => "reference",
      Self::Call { .. } => "call",
    }
  }
}

impl fmt::Display for Operator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.description())
  }
}

/// Accepted operand counts for one operator token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
  pub min: usize,
  pub max: Option<usize>,
}

impl Arity {
  const fn exactly(n: usize) -> Self {
    Self {
      min: n,
      max: Some(n),
    }
  }

  const fn at_least(n: usize) -> Self {
    Self { min: n, max: None }
  }

  const fn between(min: usize, max: usize) -> Self {
    Self {
      min,
      max: Some(max),
    }
  }

  pub fn accepts(self, count: usize) -> bool {
    count >= self.min && self.max.is_none_or(|max| count <= max)
  }

  fn describe(self) -> String {
    match self.max {
      Some(max) if max == self.min => format!("exactly {max}"),
      Some(max) => format!("between {} and {max}", self.min),
      None => format!("at least {}", self.min),
    }
  }
}

/// Name and operand-count bounds for a token in operator position.
pub fn arity_of(kind: TokenKind) -> Option<(&'static str, Arity)> {
  let entry = match kind {
    TokenKind::Plus => ("addition", Arity::at_least(2)),
    TokenKind::Dash => ("subtraction/negation", Arity::between(1, 2)),
    TokenKind::Star => ("multiplication/dereference", Arity::at_least(1)),
    TokenKind::Slash => ("division", Arity::exactly(2)),
    TokenKind::Percent => ("modulus", Arity::exactly(2)),
    TokenKind::Equals => ("assignment", Arity::exactly(2)),
    TokenKind::DoubleEquals => ("equality", Arity::exactly(2)),
    TokenKind::BangEquals => ("not-equality", Arity::exactly(2)),
    TokenKind::LeftAngle => ("less-than", Arity::exactly(2)),
    TokenKind::LeftAngleEquals => ("less-than-or-equals", Arity::exactly(2)),
    TokenKind::RightAngle => ("greater-than", Arity::exactly(2)),
    TokenKind::RightAngleEquals => ("greater-than-or-equals", Arity::exactly(2)),
    TokenKind::DoubleAmpersand => ("logical and", Arity::exactly(2)),
    TokenKind::DoubleBar => ("logical or", Arity::exactly(2)),
    TokenKind::Bang => ("logical not", Arity::exactly(1)),
    TokenKind::Ampersand => ("bitwise and", Arity::exactly(2)),
    TokenKind::Bar => ("bitwise or", Arity::exactly(2)),
    TokenKind::Caret => ("bitwise xor", Arity::exactly(2)),
    TokenKind::Tilde => ("bitwise not", Arity::exactly(1)),
    TokenKind::DoubleLeftAngle => ("shift left", Arity::exactly(2)),
    TokenKind::DoubleRightAngle => ("shift right", Arity::exactly(2)),
    TokenKind::At => ("reference", Arity::exactly(1)),
    TokenKind::Name => ("call", Arity::at_least(0)),
    _ => return None,
  };
  Some(entry)
}

/// Map an operator token and its operand count to a concrete operator.
pub fn resolve(source: &str, token: &Token, operand_count: usize) -> CompileResult<Operator> {
  let Some((name, arity)) = arity_of(token.kind) else {
    return Err(CompileError::at(
      source,
      ErrorKind::Syntax,
      token.loc,
      format!("'{}' is not an operator", token.text),
    ));
  };

  if !arity.accepts(operand_count) {
    return Err(CompileError::at(
      source,
      ErrorKind::Arity,
      token.loc,
      format!(
        "{name} ({}) requires {} operand(s), found {operand_count}",
        token.text,
        arity.describe()
      ),
    ));
  }

  let operator = match (token.kind, operand_count) {
    (TokenKind::Plus, _) => Operator::Addition,
    (TokenKind::Dash, 1) => Operator::Negation,
    (TokenKind::Dash, _) => Operator::Subtraction,
    (TokenKind::Star, 1) => Operator::Dereference,
    (TokenKind::Star, _) => Operator::Multiplication,
    (TokenKind::Slash, _) => Operator::Division,
    (TokenKind::Percent, _) => Operator::Modulus,
    (TokenKind::Equals, _) => Operator::Assignment,
    (TokenKind::DoubleEquals, _) => Operator::Equality,
    (TokenKind::BangEquals, _) => Operator::NotEquality,
    (TokenKind::LeftAngle, _) => Operator::LessThan,
    (TokenKind::LeftAngleEquals, _) => Operator::LessThanEquals,
    (TokenKind::RightAngle, _) => Operator::GreaterThan,
    (TokenKind::RightAngleEquals, _) => Operator::GreaterThanEquals,
    (TokenKind::DoubleAmpersand, _) => Operator::LogicalAnd,
    (TokenKind::DoubleBar, _) => Operator::LogicalOr,
    (TokenKind::Bang, _) => Operator::LogicalNot,
    (TokenKind::Ampersand, _) => Operator::BitwiseAnd,
    (TokenKind::Bar, _) => Operator::BitwiseOr,
    (TokenKind::Caret, _) => Operator::BitwiseXor,
    (TokenKind::Tilde, _) => Operator::BitwiseNot,
    (TokenKind::DoubleLeftAngle, _) => Operator::ShiftLeft,
    (TokenKind::DoubleRightAngle, _) => Operator::ShiftRight,
    (TokenKind::At, _) => Operator::Reference,
    (TokenKind::Name, _) => Operator::Call { callee: None },
    (kind, count) => {
      return Err(CompileError::internal(format!(
        "no operator for {kind:?} with {count} operand(s)"
      )));
    }
  };
  log::trace!("resolved {token} with {operand_count} operand(s) to {operator}");
  Ok(operator)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn resolve_kind(kind: TokenKind, count: usize) -> CompileResult<Operator> {
    let token = Token::punctuator(kind, 0);
    resolve("(x)", &token, count)
  }

  #[test]
  fn dash_depends_on_arity() {
    assert_eq!(resolve_kind(TokenKind::Dash, 1).unwrap(), Operator::Negation);
    assert_eq!(resolve_kind(TokenKind::Dash, 2).unwrap(), Operator::Subtraction);
    let err = resolve_kind(TokenKind::Dash, 3).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Arity));
    assert!(err.message().contains("between 1 and 2"), "{}", err.message());
  }

  #[test]
  fn star_depends_on_arity() {
    assert_eq!(resolve_kind(TokenKind::Star, 1).unwrap(), Operator::Dereference);
    assert_eq!(resolve_kind(TokenKind::Star, 2).unwrap(), Operator::Multiplication);
    assert_eq!(resolve_kind(TokenKind::Star, 5).unwrap(), Operator::Multiplication);
    assert!(resolve_kind(TokenKind::Star, 0).is_err());
  }

  #[test]
  fn addition_needs_two_operands() {
    assert_eq!(resolve_kind(TokenKind::Plus, 4).unwrap(), Operator::Addition);
    let err = resolve_kind(TokenKind::Plus, 1).unwrap_err();
    assert!(err.message().contains("at least 2"), "{}", err.message());
  }

  #[test]
  fn fixed_arities() {
    assert_eq!(resolve_kind(TokenKind::At, 1).unwrap(), Operator::Reference);
    assert_eq!(resolve_kind(TokenKind::Bang, 1).unwrap(), Operator::LogicalNot);
    assert_eq!(resolve_kind(TokenKind::DoubleRightAngle, 2).unwrap(), Operator::ShiftRight);
    let err = resolve_kind(TokenKind::Slash, 3).unwrap_err();
    assert!(err.message().contains("exactly 2"), "{}", err.message());
    assert!(resolve_kind(TokenKind::Tilde, 2).is_err());
  }

  #[test]
  fn names_are_calls_of_any_arity() {
    let token = Token::new(TokenKind::Name, 1, "f");
    assert_eq!(resolve("(f)", &token, 0).unwrap(), Operator::Call { callee: None });
    assert_eq!(resolve("(f)", &token, 6).unwrap(), Operator::Call { callee: None });
  }

  #[test]
  fn non_operator_tokens_are_rejected() {
    let token = Token::new(TokenKind::Integer, 1, "5");
    let err = resolve("(5 1)", &token, 1).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Syntax));
  }

  #[test]
  fn only_dereference_has_a_reference() {
    assert!(Operator::Dereference.has_reference());
    assert!(!Operator::Addition.has_reference());
    assert!(!Operator::Call { callee: Some(0) }.has_reference());
  }
}
