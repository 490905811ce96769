//! Abstract syntax tree and declarations.
//!
//! The parser builds the tree bottom-up. Two later passes decorate it in
//! place: the binder fills in operator identities and declaration links, the
//! verifier fills in result types. Declarations are referred to by index into
//! their owning list, never by pointer, so the tree stays a plain tree.

use std::collections::HashMap;
use std::fmt;

use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::operator::Operator;
use crate::tokenizer::Token;
use crate::ty::Type;

/// What a name in a symbol table stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
  Parameter(usize),
  Local(usize),
  Global(usize),
  Procedure(usize),
}

pub type SymbolTable = HashMap<String, Symbol>;

/// Storage a bound variable refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableRef {
  Parameter(usize),
  Local(usize),
  Global(usize),
}

/// A named, typed storage location: a global, a local or a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
  pub name: String,
  pub ty: Type,
  pub loc: usize,
}

impl VariableDecl {
  pub fn new(name: impl Into<String>, ty: Type, loc: usize) -> Self {
    Self {
      name: name.into(),
      ty,
      loc,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
  Variable(VariableDecl),
  /// `etcetera`: any number of further, unchecked arguments.
  Etcetera { loc: usize },
}

impl Parameter {
  pub fn loc(&self) -> usize {
    match self {
      Self::Variable(decl) => decl.loc,
      Self::Etcetera { loc } => *loc,
    }
  }

  pub fn as_variable(&self) -> Option<&VariableDecl> {
    match self {
      Self::Variable(decl) => Some(decl),
      Self::Etcetera { .. } => None,
    }
  }
}

#[derive(Debug, Clone)]
pub enum ProcedureKind {
  Internal {
    locals: Vec<VariableDecl>,
    body: Statement,
  },
  External,
}

#[derive(Debug, Clone)]
pub struct Procedure {
  pub name: String,
  pub loc: usize,
  pub return_type: Type,
  pub parameters: Vec<Parameter>,
  pub kind: ProcedureKind,
  /// Parameters and locals by name.
  pub symbols: SymbolTable,
}

impl Procedure {
  /// A procedure with a body. Parameters and locals share one namespace.
  pub fn internal(
    source: &str,
    name: &Token,
    return_type: Type,
    parameters: Vec<Parameter>,
    locals: Vec<VariableDecl>,
    body: Statement,
  ) -> CompileResult<Self> {
    let mut symbols = parameter_table(source, &parameters)?;
    for (index, local) in locals.iter().enumerate() {
      declare(source, &mut symbols, &local.name, local.loc, Symbol::Local(index))?;
    }
    Ok(Self {
      name: name.text.clone(),
      loc: name.loc,
      return_type,
      parameters,
      kind: ProcedureKind::Internal { locals, body },
      symbols,
    })
  }

  pub fn external(
    source: &str,
    name: &Token,
    return_type: Type,
    parameters: Vec<Parameter>,
  ) -> CompileResult<Self> {
    let symbols = parameter_table(source, &parameters)?;
    Ok(Self {
      name: name.text.clone(),
      loc: name.loc,
      return_type,
      parameters,
      kind: ProcedureKind::External,
      symbols,
    })
  }

  pub fn is_external(&self) -> bool {
    matches!(self.kind, ProcedureKind::External)
  }

  /// Whether the parameter list ends in `etcetera`.
  pub fn is_variadic(&self) -> bool {
    matches!(self.parameters.last(), Some(Parameter::Etcetera { .. }))
  }

  pub fn locals(&self) -> &[VariableDecl] {
    match &self.kind {
      ProcedureKind::Internal { locals, .. } => locals,
      ProcedureKind::External => &[],
    }
  }

  pub fn signature(&self) -> Signature {
    Signature {
      name: self.name.clone(),
      return_type: self.return_type.clone(),
      parameters: self
        .parameters
        .iter()
        .map(|p| p.as_variable().map(|decl| decl.ty.clone()))
        .collect(),
    }
  }
}

/// What a call site needs to know about its callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
  pub name: String,
  pub return_type: Type,
  /// Declared parameter types; `None` marks `etcetera`.
  pub parameters: Vec<Option<Type>>,
}

impl Signature {
  pub fn is_variadic(&self) -> bool {
    self.parameters.iter().any(Option::is_none)
  }
}

fn parameter_table(source: &str, parameters: &[Parameter]) -> CompileResult<SymbolTable> {
  let mut symbols = SymbolTable::new();
  for (index, parameter) in parameters.iter().enumerate() {
    if let Parameter::Variable(decl) = parameter {
      declare(source, &mut symbols, &decl.name, decl.loc, Symbol::Parameter(index))?;
    }
  }
  Ok(symbols)
}

fn declare(
  source: &str,
  table: &mut SymbolTable,
  name: &str,
  loc: usize,
  symbol: Symbol,
) -> CompileResult<()> {
  if table.insert(name.to_string(), symbol).is_some() {
    return Err(CompileError::at(
      source,
      ErrorKind::Declaration,
      loc,
      format!("Duplicate declaration of '{name}'"),
    ));
  }
  Ok(())
}

/// A whole compilation unit.
#[derive(Debug, Clone)]
pub struct Program {
  pub globals: Vec<VariableDecl>,
  pub procedures: Vec<Procedure>,
  pub global_table: SymbolTable,
  pub procedure_table: SymbolTable,
}

impl Program {
  /// Build the program and its top-level symbol tables. Duplicate names
  /// within either table are fatal.
  pub fn new(
    source: &str,
    globals: Vec<VariableDecl>,
    procedures: Vec<Procedure>,
  ) -> CompileResult<Self> {
    let mut global_table = SymbolTable::new();
    for (index, global) in globals.iter().enumerate() {
      declare(source, &mut global_table, &global.name, global.loc, Symbol::Global(index))?;
    }
    let mut procedure_table = SymbolTable::new();
    for (index, procedure) in procedures.iter().enumerate() {
      declare(
        source,
        &mut procedure_table,
        &procedure.name,
        procedure.loc,
        Symbol::Procedure(index),
      )?;
    }
    Ok(Self {
      globals,
      procedures,
      global_table,
      procedure_table,
    })
  }
}

#[derive(Debug, Clone)]
pub enum Statement {
  Multi {
    loc: usize,
    statements: Vec<Statement>,
  },
  If {
    loc: usize,
    condition: Expression,
    then_branch: Box<Statement>,
    else_branch: Option<Box<Statement>>,
  },
  While {
    loc: usize,
    condition: Expression,
    body: Box<Statement>,
  },
  Return {
    loc: usize,
    value: Option<Expression>,
  },
  Expression(Expression),
}

impl Statement {
  pub fn loc(&self) -> usize {
    match self {
      Self::Multi { loc, .. }
      | Self::If { loc, .. }
      | Self::While { loc, .. }
      | Self::Return { loc, .. } => *loc,
      Self::Expression(expr) => expr.loc(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
  Integer(i64),
  Character(u8),
  Boolean(bool),
  String(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Literal {
  pub value: LiteralValue,
  pub loc: usize,
}

impl Literal {
  pub fn ty(&self) -> Type {
    match self.value {
      LiteralValue::Integer(_) => Type::int(self.loc),
      LiteralValue::Character(_) => Type::char(self.loc),
      LiteralValue::Boolean(_) => Type::bool(self.loc),
      LiteralValue::String(_) => Type::pointer_to(Type::char(self.loc), self.loc),
    }
  }

  /// Label of the static backing this literal, if it needs one. The `$`
  /// keeps it apart from every name a program can declare.
  pub fn static_label(&self) -> Option<String> {
    match self.value {
      LiteralValue::Character(_) => Some(format!("char${}", self.loc)),
      LiteralValue::String(_) => Some(format!("string${}", self.loc)),
      LiteralValue::Integer(_) | LiteralValue::Boolean(_) => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Variable {
  pub name: String,
  pub loc: usize,
  /// Set by the binder.
  pub binding: Option<VariableRef>,
  /// Set by the verifier.
  pub ty: Option<Type>,
}

impl Variable {
  pub fn new(name: impl Into<String>, loc: usize) -> Self {
    Self {
      name: name.into(),
      loc,
      binding: None,
      ty: None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Operation {
  /// Position of the opening parenthesis.
  pub loc: usize,
  pub token: Token,
  pub operands: Vec<Expression>,
  /// Set by the binder, from the token and the operand count.
  pub operator: Option<Operator>,
  /// Set by the verifier.
  pub ty: Option<Type>,
}

impl Operation {
  pub fn new(loc: usize, token: Token, operands: Vec<Expression>) -> Self {
    Self {
      loc,
      token,
      operands,
      operator: None,
      ty: None,
    }
  }
}

#[derive(Debug, Clone)]
pub enum Expression {
  Literal(Literal),
  Variable(Variable),
  Operation(Operation),
}

impl Expression {
  pub fn loc(&self) -> usize {
    match self {
      Self::Literal(literal) => literal.loc,
      Self::Variable(variable) => variable.loc,
      Self::Operation(operation) => operation.loc,
    }
  }

  /// The type recorded for this expression, once verified.
  pub fn ty(&self) -> CompileResult<Type> {
    let ty = match self {
      Self::Literal(literal) => Some(literal.ty()),
      Self::Variable(variable) => variable.ty.clone(),
      Self::Operation(operation) => operation.ty.clone(),
    };
    ty.ok_or_else(|| CompileError::internal(format!("expression {self} used before verification")))
  }
}

impl fmt::Display for Expression {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Literal(literal) => match &literal.value {
        LiteralValue::Integer(value) => write!(f, "{value}"),
        LiteralValue::Character(value) => {
          write!(f, "'{}'", char::from(*value).escape_default())
        }
        LiteralValue::Boolean(value) => write!(f, "{value}"),
        LiteralValue::String(bytes) => {
          write!(f, "\"{}\"", String::from_utf8_lossy(bytes).escape_default())
        }
      },
      Self::Variable(variable) => f.write_str(&variable.name),
      Self::Operation(operation) => {
        write!(f, "({}", operation.token.text)?;
        for operand in &operation.operands {
          write!(f, " {operand}")?;
        }
        f.write_str(")")
      }
    }
  }
}
