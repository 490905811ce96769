//! Recursive-descent parser producing the program AST.
//!
//! Every production either matches, returns `Ok(None)` without consuming
//! anything, or fails hard. A production fails hard only once it has been
//! unambiguously started: an opening brace always begins a multi-statement,
//! so a missing closing brace is an error rather than a reason to backtrack.
//!
//! Operations keep their operator token and raw operand list; which operator
//! the token denotes is left to the binder, since it depends on arity.

use crate::ast::{
  Expression, Literal, LiteralValue, Operation, Parameter, Procedure, Program, Statement, Variable,
  VariableDecl,
};
use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::tokenizer::{Token, TokenKind, describe_token};
use crate::ty::Type;

/// Parse a whole program from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);

  let globals = parse_var_list(&mut stream)?;
  log::debug!(
    "global variables: [{}]",
    globals.iter().map(|g| format!("{} {}", g.ty, g.name)).collect::<Vec<_>>().join(", ")
  );

  let mut procedures = Vec::new();
  while let Some(procedure) = parse_procedure(&mut stream)? {
    log::debug!(
      "parsed {} procedure {}",
      if procedure.is_external() { "external" } else { "internal" },
      procedure.name
    );
    procedures.push(procedure);
  }

  if let Some(token) = stream.peek() {
    let got = describe_token(Some(token));
    let loc = token.loc;
    return Err(stream.error(loc, format!("unexpected token \"{got}\"")));
  }

  Program::new(source, globals, procedures)
}

/// `varlist ::= '[' (vardecl (',' vardecl)*)? ']' | ε`
fn parse_var_list(stream: &mut TokenStream) -> CompileResult<Vec<VariableDecl>> {
  let mut variables = Vec::new();
  if stream.consume(TokenKind::OpenBracket).is_none() {
    return Ok(variables);
  }
  if stream.consume(TokenKind::CloseBracket).is_some() {
    return Ok(variables);
  }

  loop {
    variables.push(parse_var_decl(stream)?);
    if stream.consume(TokenKind::Comma).is_some() {
      continue;
    }
    stream.expect(TokenKind::CloseBracket, "',' or ']'")?;
    return Ok(variables);
  }
}

/// `vardecl ::= type NAME`
fn parse_var_decl(stream: &mut TokenStream) -> CompileResult<VariableDecl> {
  let ty = parse_type(stream)?;
  let name = stream.expect(TokenKind::Name, "variable name")?;
  Ok(VariableDecl::new(name.text, ty, name.loc))
}

/// `type ::= ('char' | 'int' | 'bool' | 'void') '*'*`
///
/// A type is only ever asked for where one must appear, so this never
/// backtracks.
fn parse_type(stream: &mut TokenStream) -> CompileResult<Type> {
  let name = stream.expect(TokenKind::Name, "type name")?;
  let mut ty = match name.text.as_str() {
    "int" => Type::int(name.loc),
    "char" => Type::char(name.loc),
    "bool" => Type::bool(name.loc),
    "void" => Type::void(name.loc),
    other => {
      return Err(stream.error(name.loc, format!("Invalid type name {other}")));
    }
  };
  while let Some(star) = stream.consume(TokenKind::Star) {
    ty = Type::pointer_to(ty, star.loc);
  }
  Ok(ty)
}

/// `proc ::= ('proc' | 'extern') type NAME '(' paramlist ')' (varlist statement)?`
///
/// Only `proc` takes locals and a body; `extern` declarations end at the
/// parameter list.
fn parse_procedure(stream: &mut TokenStream) -> CompileResult<Option<Procedure>> {
  let external = if stream.consume(TokenKind::Proc).is_some() {
    false
  } else if stream.consume(TokenKind::Extern).is_some() {
    true
  } else {
    return Ok(None);
  };

  let return_type = parse_type(stream)?;
  let name = stream.expect(TokenKind::Name, "procedure name")?;
  let parameters = parse_parameter_list(stream)?;

  if external {
    return Procedure::external(stream.source, &name, return_type, parameters).map(Some);
  }

  let locals = parse_var_list(stream)?;
  let Some(body) = parse_statement(stream)? else {
    let loc = stream.current_loc();
    return Err(stream.error(loc, format!("Invalid procedure body for {}", name.text)));
  };
  Procedure::internal(stream.source, &name, return_type, parameters, locals, body).map(Some)
}

/// `'(' ((vardecl | 'etcetera') (',' (vardecl | 'etcetera'))*)? ')'`
///
/// Where `etcetera` may legally appear is decided by the verifier.
fn parse_parameter_list(stream: &mut TokenStream) -> CompileResult<Vec<Parameter>> {
  stream.expect(TokenKind::OpenParen, "parameter list")?;
  let mut parameters = Vec::new();
  if stream.consume(TokenKind::CloseParen).is_some() {
    return Ok(parameters);
  }

  loop {
    let parameter = match stream.consume(TokenKind::Etcetera) {
      Some(token) => Parameter::Etcetera { loc: token.loc },
      None => Parameter::Variable(parse_var_decl(stream)?),
    };
    parameters.push(parameter);
    if stream.consume(TokenKind::Comma).is_some() {
      continue;
    }
    stream.expect(TokenKind::CloseParen, "',' or ')'")?;
    return Ok(parameters);
  }
}

/// `statement ::= '{' statement* '}' | conditional | loop | return | expression`
fn parse_statement(stream: &mut TokenStream) -> CompileResult<Option<Statement>> {
  let kind = stream.peek().map(|token| token.kind);
  match kind {
    Some(TokenKind::OpenBrace) => parse_multi_statement(stream).map(Some),
    Some(TokenKind::If) => parse_conditional(stream).map(Some),
    Some(TokenKind::While) => parse_loop(stream).map(Some),
    Some(TokenKind::Return) => parse_return(stream).map(Some),
    _ => Ok(parse_expression(stream)?.map(Statement::Expression)),
  }
}

fn parse_multi_statement(stream: &mut TokenStream) -> CompileResult<Statement> {
  let open = stream.expect(TokenKind::OpenBrace, "'{'")?;
  let mut statements = Vec::new();
  while let Some(statement) = parse_statement(stream)? {
    statements.push(statement);
  }

  match stream.peek() {
    Some(token) if token.kind == TokenKind::CloseBrace => {
      stream.advance();
      Ok(Statement::Multi {
        loc: open.loc,
        statements,
      })
    }
    Some(token) => {
      let loc = token.loc;
      Err(stream.error(
        loc,
        format!("Expected closing brace for multi-statement started at @{}", open.loc),
      ))
    }
    None => Err(stream.error(open.loc, "Input ends before close of multi-statement")),
  }
}

/// `conditional ::= 'if' expression statement ('else' statement)?`
fn parse_conditional(stream: &mut TokenStream) -> CompileResult<Statement> {
  let if_token = stream.expect(TokenKind::If, "'if'")?;
  let Some(condition) = parse_expression(stream)? else {
    return Err(stream.error(if_token.loc, "Conditional expression expected"));
  };
  let Some(then_branch) = parse_statement(stream)? else {
    return Err(stream.error(if_token.loc, "Conditional then-branch expected"));
  };

  let else_branch = match stream.consume(TokenKind::Else) {
    Some(else_token) => match parse_statement(stream)? {
      Some(statement) => Some(Box::new(statement)),
      None => return Err(stream.error(else_token.loc, "Incomplete else-branch")),
    },
    None => None,
  };

  Ok(Statement::If {
    loc: if_token.loc,
    condition,
    then_branch: Box::new(then_branch),
    else_branch,
  })
}

/// `loop ::= 'while' expression statement`
fn parse_loop(stream: &mut TokenStream) -> CompileResult<Statement> {
  let while_token = stream.expect(TokenKind::While, "'while'")?;
  let Some(condition) = parse_expression(stream)? else {
    return Err(stream.error(while_token.loc, "Loop condition expected"));
  };
  let Some(body) = parse_statement(stream)? else {
    return Err(stream.error(while_token.loc, "Loop body expected"));
  };
  Ok(Statement::While {
    loc: while_token.loc,
    condition,
    body: Box::new(body),
  })
}

/// `return ::= 'return' expression?`
fn parse_return(stream: &mut TokenStream) -> CompileResult<Statement> {
  let return_token = stream.expect(TokenKind::Return, "'return'")?;
  let value = parse_expression(stream)?;
  Ok(Statement::Return {
    loc: return_token.loc,
    value,
  })
}

/// `expression ::= literal | sizeof | operation | NAME`
fn parse_expression(stream: &mut TokenStream) -> CompileResult<Option<Expression>> {
  let Some(token) = stream.peek().cloned() else {
    return Ok(None);
  };

  let value = match token.kind {
    TokenKind::Integer => {
      let value = token.text.parse::<i64>().map_err(|_| {
        stream.error(token.loc, "Integer literal cannot be stored in an int")
      })?;
      LiteralValue::Integer(value)
    }
    TokenKind::Char => LiteralValue::Character(token.text.bytes().next().unwrap_or(0)),
    TokenKind::Boolean => LiteralValue::Boolean(token.text == "true"),
    TokenKind::String => LiteralValue::String(token.text.clone().into_bytes()),
    TokenKind::Sizeof => return parse_sizeof(stream).map(Some),
    TokenKind::OpenParen => return parse_operation(stream).map(|op| Some(Expression::Operation(op))),
    TokenKind::Name => {
      stream.advance();
      return Ok(Some(Expression::Variable(Variable::new(token.text, token.loc))));
    }
    _ => return Ok(None),
  };

  stream.advance();
  Ok(Some(Expression::Literal(Literal {
    value,
    loc: token.loc,
  })))
}

/// `sizeof ::= 'sizeof' '(' type ')'`, folded to an integer literal.
fn parse_sizeof(stream: &mut TokenStream) -> CompileResult<Expression> {
  let sizeof_token = stream.expect(TokenKind::Sizeof, "'sizeof'")?;
  stream.expect(TokenKind::OpenParen, "'(' after sizeof")?;
  let ty = parse_type(stream)?;
  stream.expect(TokenKind::CloseParen, "')' at end of sizeof")?;
  let Some(size) = ty.size() else {
    return Err(stream.error(ty.loc, format!("sizeof requires a sized type, not {ty}")));
  };
  Ok(Expression::Literal(Literal {
    value: LiteralValue::Integer(size),
    loc: sizeof_token.loc,
  }))
}

/// `operation ::= '(' token expression* ')'`
fn parse_operation(stream: &mut TokenStream) -> CompileResult<Operation> {
  let open = stream.expect(TokenKind::OpenParen, "'('")?;

  let Some(token) = stream.peek().cloned() else {
    return Err(stream.error(open.loc, "Operator expected after '('"));
  };
  if !token.kind.is_operator() && token.kind != TokenKind::Name {
    let got = describe_token(Some(&token));
    return Err(stream.error(token.loc, format!("expected an operator, but got \"{got}\"")));
  }
  stream.advance();

  let mut operands = Vec::new();
  while let Some(operand) = parse_expression(stream)? {
    operands.push(operand);
  }
  stream.expect(TokenKind::CloseParen, "')' at end of operation")?;

  Ok(Operation::new(open.loc, token, operands))
}

/// Cursor over the token vector. Whitespace tokens are skipped whenever the
/// next significant token is looked at.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn skip_whitespace(&mut self) {
    while let Some(token) = self.tokens.get(self.pos)
      && token.kind.is_whitespace()
    {
      self.pos += 1;
    }
  }

  /// The next non-whitespace token, if any.
  fn peek(&mut self) -> Option<&Token> {
    self.skip_whitespace();
    self.tokens.get(self.pos)
  }

  fn advance(&mut self) {
    self.pos += 1;
  }

  /// Consume the next token if it has the given kind.
  fn consume(&mut self, kind: TokenKind) -> Option<Token> {
    let token = self.peek().filter(|token| token.kind == kind).cloned()?;
    self.pos += 1;
    Some(token)
  }

  fn expect(&mut self, kind: TokenKind, what: &str) -> CompileResult<Token> {
    if let Some(token) = self.consume(kind) {
      return Ok(token);
    }
    let loc = self.current_loc();
    let got = describe_token(self.tokens.get(self.pos));
    Err(self.error(loc, format!("expected {what}, but got \"{got}\"")))
  }

  /// Where the next significant token starts, or the end of input.
  fn current_loc(&mut self) -> usize {
    let end = self.source.len();
    self.peek().map_or(end, |token| token.loc)
  }

  fn error(&self, loc: usize, message: impl Into<String>) -> CompileError {
    CompileError::at(self.source, ErrorKind::Syntax, loc, message)
  }
}
