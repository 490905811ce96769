//! Name binding.
//!
//! All top-level declarations are entered into the program's tables when the
//! `Program` is built, so by the time bodies are walked here a call may refer
//! to a procedure declared further down the file.
//!
//! Each operation has its operator resolved before its operands are bound.
//! Names are looked up in the procedure's own table first, then among the
//! globals, then among the procedures. A name that is not found at all is
//! left unbound; the verifier reports it.

use crate::ast::{
  Expression, Operation, Procedure, ProcedureKind, Program, Statement, Symbol, SymbolTable,
  Variable, VariableRef,
};
use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::operator::{self, Operator};

/// Resolve operators and names in every procedure body.
pub fn bind(source: &str, program: &mut Program) -> CompileResult<()> {
  let Program {
    procedures,
    global_table,
    procedure_table,
    ..
  } = program;

  for procedure in procedures.iter_mut() {
    let Procedure {
      name, symbols, kind, ..
    } = procedure;
    let ProcedureKind::Internal { body, .. } = kind else {
      continue;
    };

    let scope = Scope {
      source,
      locals: symbols,
      globals: global_table,
      procedures: procedure_table,
    };
    scope.bind_statement(body)?;
    log::debug!("bound procedure {name}");
  }
  Ok(())
}

/// The three namespaces visible from one procedure body.
struct Scope<'a> {
  source: &'a str,
  locals: &'a SymbolTable,
  globals: &'a SymbolTable,
  procedures: &'a SymbolTable,
}

impl Scope<'_> {
  fn lookup(&self, name: &str) -> Option<Symbol> {
    self
      .locals
      .get(name)
      .or_else(|| self.globals.get(name))
      .or_else(|| self.procedures.get(name))
      .copied()
  }

  fn bind_statement(&self, statement: &mut Statement) -> CompileResult<()> {
    match statement {
      Statement::Multi { statements, .. } => {
        for statement in statements {
          self.bind_statement(statement)?;
        }
      }
      Statement::If {
        condition,
        then_branch,
        else_branch,
        ..
      } => {
        self.bind_expression(condition)?;
        self.bind_statement(then_branch)?;
        if let Some(else_branch) = else_branch {
          self.bind_statement(else_branch)?;
        }
      }
      Statement::While {
        condition, body, ..
      } => {
        self.bind_expression(condition)?;
        self.bind_statement(body)?;
      }
      Statement::Return { value, .. } => {
        if let Some(value) = value {
          self.bind_expression(value)?;
        }
      }
      Statement::Expression(expression) => self.bind_expression(expression)?,
    }
    Ok(())
  }

  fn bind_expression(&self, expression: &mut Expression) -> CompileResult<()> {
    match expression {
      Expression::Literal(_) => Ok(()),
      Expression::Variable(variable) => self.bind_variable(variable),
      Expression::Operation(operation) => self.bind_operation(operation),
    }
  }

  fn bind_variable(&self, variable: &mut Variable) -> CompileResult<()> {
    let binding = match self.lookup(&variable.name) {
      Some(Symbol::Parameter(index)) => VariableRef::Parameter(index),
      Some(Symbol::Local(index)) => VariableRef::Local(index),
      Some(Symbol::Global(index)) => VariableRef::Global(index),
      Some(Symbol::Procedure(_)) => {
        return Err(CompileError::at(
          self.source,
          ErrorKind::Binding,
          variable.loc,
          format!("cannot use a procedure as a variable: {}", variable.name),
        ));
      }
      None => {
        log::trace!("{} @{} left unbound", variable.name, variable.loc);
        return Ok(());
      }
    };
    log::trace!("bound {} @{} to {binding:?}", variable.name, variable.loc);
    variable.binding = Some(binding);
    Ok(())
  }

  fn bind_operation(&self, operation: &mut Operation) -> CompileResult<()> {
    let operator = match operation.operator {
      Some(operator) => operator,
      None => operator::resolve(self.source, &operation.token, operation.operands.len())?,
    };

    let operator = match operator {
      Operator::Call { callee: None } => {
        let name = &operation.token.text;
        let callee = match self.lookup(name) {
          Some(Symbol::Procedure(index)) => Some(index),
          Some(_) => {
            return Err(CompileError::at(
              self.source,
              ErrorKind::Binding,
              operation.token.loc,
              format!("cannot use a variable as a procedure: {name}"),
            ));
          }
          None => {
            log::trace!("call to {name} @{} left unbound", operation.token.loc);
            None
          }
        };
        Operator::Call { callee }
      }
      other => other,
    };
    operation.operator = Some(operator);

    for operand in &mut operation.operands {
      self.bind_expression(operand)?;
    }
    Ok(())
  }
}
