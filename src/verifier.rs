//! Static checking.
//!
//! Runs after binding. Every expression is given its result type here, and
//! the type of an operation is attributed to the operation's own position.
//! Each operand is verified exactly once, by the operation that owns it.
//! The first violation aborts verification; the only non-fatal finding is an
//! implicit `void*` conversion on assignment, collected as a [`Warning`].

use crate::ast::{
  Expression, Operation, Parameter, Procedure, ProcedureKind, Program, Signature, Statement,
  Variable, VariableDecl, VariableRef,
};
use crate::error::{CompileError, CompileResult, ErrorKind, Warning};
use crate::operator::Operator;
use crate::ty::Type;

/// Integer argument registers available to a call.
pub const MAX_ARGUMENTS: usize = 6;

/// Type-check the whole program, returning the warnings raised on the way.
pub fn verify(source: &str, program: &mut Program) -> CompileResult<Vec<Warning>> {
  for global in &program.globals {
    check_not_void(source, global)?;
  }
  for procedure in &program.procedures {
    verify_declaration(source, procedure)?;
  }

  let signatures: Vec<Signature> = program.procedures.iter().map(Procedure::signature).collect();
  let mut warnings = Vec::new();
  let Program {
    globals, procedures, ..
  } = program;

  for procedure in procedures.iter_mut() {
    let Procedure {
      name,
      return_type,
      parameters,
      kind,
      ..
    } = procedure;
    let ProcedureKind::Internal { locals, body } = kind else {
      continue;
    };

    let mut verifier = Verifier {
      source,
      globals: globals.as_slice(),
      parameters: parameters.as_slice(),
      locals: locals.as_slice(),
      signatures: &signatures,
      return_type,
      warnings: &mut warnings,
    };
    verifier.verify_statement(body)?;
    log::debug!("verified procedure {name}");
  }

  Ok(warnings)
}

fn check_not_void(source: &str, decl: &VariableDecl) -> CompileResult<()> {
  if decl.ty.is_void() {
    return Err(CompileError::at(
      source,
      ErrorKind::Type,
      decl.loc,
      format!("Cannot define variable of void type: {}", decl.name),
    ));
  }
  Ok(())
}

/// Parameter-list rules, which depend on whether the procedure has a body.
fn verify_declaration(source: &str, procedure: &Procedure) -> CompileResult<()> {
  let last = procedure.parameters.len().saturating_sub(1);
  for (index, parameter) in procedure.parameters.iter().enumerate() {
    match parameter {
      Parameter::Variable(decl) => check_not_void(source, decl)?,
      Parameter::Etcetera { .. } => {
        let message = if !procedure.is_external() {
          "Internal procedures may not use etcetera"
        } else if index != last {
          "Parameter list may only use etcetera at the end"
        } else {
          continue;
        };
        return Err(CompileError::at(
          source,
          ErrorKind::Declaration,
          parameter.loc(),
          message,
        ));
      }
    }
  }

  if !procedure.is_external() && procedure.parameters.len() > MAX_ARGUMENTS {
    return Err(CompileError::at(
      source,
      ErrorKind::Arity,
      procedure.loc,
      format!(
        "{} declares {} parameters; at most {MAX_ARGUMENTS} are supported",
        procedure.name,
        procedure.parameters.len()
      ),
    ));
  }

  for local in procedure.locals() {
    check_not_void(source, local)?;
  }
  Ok(())
}

/// Everything visible while checking one procedure body.
struct Verifier<'a> {
  source: &'a str,
  globals: &'a [VariableDecl],
  parameters: &'a [Parameter],
  locals: &'a [VariableDecl],
  signatures: &'a [Signature],
  return_type: &'a Type,
  warnings: &'a mut Vec<Warning>,
}

impl Verifier<'_> {
  fn error(&self, kind: ErrorKind, loc: usize, message: impl Into<String>) -> CompileError {
    CompileError::at(self.source, kind, loc, message)
  }

  fn verify_statement(&mut self, statement: &mut Statement) -> CompileResult<()> {
    match statement {
      Statement::Multi { statements, .. } => {
        for statement in statements {
          self.verify_statement(statement)?;
        }
      }
      Statement::If {
        condition,
        then_branch,
        else_branch,
        ..
      } => {
        self.verify_condition(condition)?;
        self.verify_statement(then_branch)?;
        if let Some(else_branch) = else_branch {
          self.verify_statement(else_branch)?;
        }
      }
      Statement::While {
        condition, body, ..
      } => {
        self.verify_condition(condition)?;
        self.verify_statement(body)?;
      }
      Statement::Return { loc, value } => {
        if let Some(value) = value {
          let ty = self.verify_expression(value)?;
          if ty != *self.return_type {
            return Err(self.error(
              ErrorKind::Type,
              *loc,
              format!(
                "Return type {ty} does not match required type {}",
                self.return_type
              ),
            ));
          }
        }
      }
      Statement::Expression(expression) => {
        self.verify_expression(expression)?;
      }
    }
    Ok(())
  }

  fn verify_condition(&mut self, condition: &mut Expression) -> CompileResult<()> {
    let ty = self.verify_expression(condition)?;
    if !ty.is_bool() {
      return Err(self.error(
        ErrorKind::Type,
        condition.loc(),
        format!("Condition must be a boolean value, found {ty}"),
      ));
    }
    Ok(())
  }

  /// Verify an expression used for its value.
  fn verify_expression(&mut self, expression: &mut Expression) -> CompileResult<Type> {
    match expression {
      Expression::Literal(literal) => Ok(literal.ty()),
      Expression::Variable(variable) => self.verify_variable(variable),
      Expression::Operation(operation) => self.verify_operation(operation),
    }
  }

  /// Verify an expression used as a storage location.
  fn verify_lvalue(&mut self, expression: &mut Expression) -> CompileResult<Type> {
    match expression {
      Expression::Variable(variable) => self.verify_variable(variable),
      Expression::Operation(operation)
        if operation.operator.is_some_and(Operator::has_reference) =>
      {
        self.verify_operation(operation)
      }
      other => Err(self.error(
        ErrorKind::LValue,
        other.loc(),
        format!("{other} is not an l-value"),
      )),
    }
  }

  fn verify_variable(&self, variable: &mut Variable) -> CompileResult<Type> {
    let Some(binding) = variable.binding else {
      return Err(self.error(
        ErrorKind::Binding,
        variable.loc,
        format!("Use of undeclared variable {}", variable.name),
      ));
    };

    let decl = match binding {
      VariableRef::Parameter(index) => self.parameters.get(index).and_then(Parameter::as_variable),
      VariableRef::Local(index) => self.locals.get(index),
      VariableRef::Global(index) => self.globals.get(index),
    };
    let Some(decl) = decl else {
      return Err(CompileError::internal(format!(
        "{} is bound to missing declaration {binding:?}",
        variable.name
      )));
    };

    let ty = decl.ty.duplicate_at(variable.loc);
    variable.ty = Some(ty.clone());
    Ok(ty)
  }

  /// Check that every operand has the wanted type.
  fn verify_all(
    &mut self,
    operands: &mut [Expression],
    wanted: fn(&Type) -> bool,
    what: &str,
  ) -> CompileResult<()> {
    for operand in operands {
      let ty = self.verify_expression(operand)?;
      if !wanted(&ty) {
        return Err(self.error(
          ErrorKind::Type,
          operand.loc(),
          format!("Operand of {what} cannot be {ty}"),
        ));
      }
    }
    Ok(())
  }

  fn verify_operation(&mut self, operation: &mut Operation) -> CompileResult<Type> {
    let Some(operator) = operation.operator else {
      return Err(CompileError::internal(format!(
        "operation at @{} verified before binding",
        operation.loc
      )));
    };
    let loc = operation.loc;
    let operands = &mut operation.operands;

    let ty = match operator {
      Operator::Addition => self.verify_addition(operands, loc)?,

      Operator::Subtraction => {
        let [left, right] = self.pair(operands, operator)?;
        let left_ty = self.verify_expression(left)?;
        let right_ty = self.verify_expression(right)?;
        if !left_ty.is_integer() && !left_ty.is_pointer() {
          return Err(self.error(
            ErrorKind::Type,
            left.loc(),
            format!("First subtraction operand cannot be {left_ty}"),
          ));
        }
        if !right_ty.is_integer() {
          return Err(self.error(
            ErrorKind::Type,
            right.loc(),
            format!("Second subtraction operand cannot be {right_ty}"),
          ));
        }
        left_ty.duplicate_at(loc)
      }

      Operator::Negation
      | Operator::Multiplication
      | Operator::Division
      | Operator::Modulus
      | Operator::BitwiseAnd
      | Operator::BitwiseOr
      | Operator::BitwiseXor
      | Operator::BitwiseNot
      | Operator::ShiftLeft
      | Operator::ShiftRight => {
        self.verify_all(operands, Type::is_integer, operator.description())?;
        Type::int(loc)
      }

      Operator::LessThan
      | Operator::LessThanEquals
      | Operator::GreaterThan
      | Operator::GreaterThanEquals => {
        self.verify_all(operands, Type::is_integer, operator.description())?;
        Type::bool(loc)
      }

      Operator::LogicalAnd | Operator::LogicalOr | Operator::LogicalNot => {
        self.verify_all(operands, Type::is_bool, operator.description())?;
        Type::bool(loc)
      }

      Operator::Equality | Operator::NotEquality => {
        let [left, right] = self.pair(operands, operator)?;
        let left_ty = self.verify_expression(left)?;
        let right_ty = self.verify_expression(right)?;
        if left_ty != right_ty {
          return Err(self.error(
            ErrorKind::Type,
            loc,
            format!(
              "Types of operands are not equivalent in {operator} operation: {left_ty} and {right_ty}"
            ),
          ));
        }
        Type::bool(loc)
      }

      Operator::Dereference => {
        let [operand] = self.single(operands, operator)?;
        let ty = self.verify_expression(operand)?;
        let Some(base) = ty.base() else {
          return Err(self.error(
            ErrorKind::Type,
            operand.loc(),
            format!("Dereference operand is not a pointer: {ty}"),
          ));
        };
        if base.is_void() {
          return Err(self.error(
            ErrorKind::Type,
            operand.loc(),
            "Pointers to void cannot be dereferenced",
          ));
        }
        base.duplicate_at(loc)
      }

      Operator::Reference => {
        let [operand] = self.single(operands, operator)?;
        let ty = self.verify_lvalue(operand)?;
        Type::pointer_to(ty, loc)
      }

      Operator::Assignment => self.verify_assignment(operands, loc)?,

      Operator::Call { callee } => {
        let Some(callee) = callee else {
          return Err(self.error(
            ErrorKind::Binding,
            operation.token.loc,
            format!("Call to undeclared procedure {}", operation.token.text),
          ));
        };
        self.verify_call(callee, operands, loc)?
      }
    };

    log::trace!("@{loc} {operator} : {ty}");
    operation.ty = Some(ty.clone());
    Ok(ty)
  }

  fn verify_addition(&mut self, operands: &mut [Expression], loc: usize) -> CompileResult<Type> {
    let mut pointer: Option<Type> = None;
    for operand in operands {
      let ty = self.verify_expression(operand)?;
      if ty.is_pointer() {
        if pointer.is_some() {
          return Err(self.error(
            ErrorKind::Type,
            operand.loc(),
            "More than one pointer as operand in addition operation",
          ));
        }
        pointer = Some(ty);
      } else if !ty.is_integer() {
        return Err(self.error(
          ErrorKind::Type,
          operand.loc(),
          format!("Invalid type of operand for addition: {ty}"),
        ));
      }
    }
    Ok(match pointer {
      Some(pointer) => pointer.duplicate_at(loc),
      None => Type::int(loc),
    })
  }

  fn verify_assignment(&mut self, operands: &mut [Expression], loc: usize) -> CompileResult<Type> {
    let [target, value] = self.pair(operands, Operator::Assignment)?;
    let target_ty = self.verify_lvalue(target)?;
    let value_ty = self.verify_expression(value)?;

    let value_is_void_pointer = value_ty.base().is_some_and(Type::is_void);
    if target_ty.is_pointer() && value_is_void_pointer {
      if !target_ty.base().is_some_and(Type::is_void) {
        let warning = Warning::at(
          self.source,
          loc,
          format!("Implicitly casting void* to {target_ty} for assignment"),
        );
        self.warnings.push(warning);
      }
    } else if target_ty != value_ty {
      return Err(self.error(
        ErrorKind::Type,
        value.loc(),
        format!("Cannot assign expression of type {value_ty} to l-value of type {target_ty}"),
      ));
    }
    Ok(target_ty.duplicate_at(loc))
  }

  fn verify_call(
    &mut self,
    callee: usize,
    arguments: &mut [Expression],
    loc: usize,
  ) -> CompileResult<Type> {
    let signatures = self.signatures;
    let Some(signature) = signatures.get(callee) else {
      return Err(CompileError::internal(format!(
        "call at @{loc} bound to missing procedure {callee}"
      )));
    };

    if arguments.len() > MAX_ARGUMENTS {
      return Err(self.error(
        ErrorKind::Arity,
        loc,
        format!(
          "Call to {} passes {} arguments; at most {MAX_ARGUMENTS} are supported",
          signature.name,
          arguments.len()
        ),
      ));
    }

    let fixed = signature.parameters.iter().take_while(|p| p.is_some()).count();
    let (accepted, expected) = if signature.is_variadic() {
      (arguments.len() >= fixed, format!("at least {fixed}"))
    } else {
      (arguments.len() == fixed, format!("{fixed}"))
    };
    if !accepted {
      return Err(self.error(
        ErrorKind::Arity,
        loc,
        format!(
          "{} expects {expected} argument(s), found {}",
          signature.name,
          arguments.len()
        ),
      ));
    }

    for (index, argument) in arguments.iter_mut().enumerate() {
      let ty = self.verify_expression(argument)?;
      if let Some(Some(expected)) = signature.parameters.get(index).filter(|_| index < fixed)
        && ty != *expected
      {
        return Err(self.error(
          ErrorKind::Type,
          argument.loc(),
          format!("Argument {argument} is of type {ty}, expecting type {expected}"),
        ));
      }
    }

    Ok(signature.return_type.duplicate_at(loc))
  }

  fn single<'e>(
    &self,
    operands: &'e mut [Expression],
    operator: Operator,
  ) -> CompileResult<&'e mut [Expression; 1]> {
    operands
      .try_into()
      .map_err(|_| CompileError::internal(format!("{operator} needs exactly one operand")))
  }

  fn pair<'e>(
    &self,
    operands: &'e mut [Expression],
    operator: Operator,
  ) -> CompileResult<&'e mut [Expression; 2]> {
    operands
      .try_into()
      .map_err(|_| CompileError::internal(format!("{operator} needs exactly two operands")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::binder::bind;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn verified(source: &str) -> CompileResult<(Program, Vec<Warning>)> {
    let mut program = parse(tokenize(source)?, source)?;
    bind(source, &mut program)?;
    let warnings = verify(source, &mut program)?;
    Ok((program, warnings))
  }

  /// Verify `expression` as the body of a procedure and return its type.
  fn type_of(globals: &str, expression: &str) -> CompileResult<Type> {
    let source = format!("{globals} proc void test() {expression}");
    let (program, _) = verified(&source)?;
    let test = program
      .procedures
      .iter()
      .find(|procedure| procedure.name == "test")
      .expect("test procedure");
    match &test.kind {
      ProcedureKind::Internal {
        body: Statement::Expression(expression),
        ..
      } => expression.ty(),
      other => panic!("unexpected body {other:?}"),
    }
  }

  fn type_name(globals: &str, expression: &str) -> String {
    type_of(globals, expression)
      .unwrap_or_else(|e| panic!("{e}"))
      .to_string()
  }

  fn error_of(globals: &str, expression: &str) -> CompileError {
    match type_of(globals, expression) {
      Ok(ty) => panic!("{expression} unexpectedly verified as {ty}"),
      Err(err) => err,
    }
  }

  #[test]
  fn arithmetic_on_integers() {
    assert_eq!(type_name("", "(+ 1 2)"), "int");
    assert_eq!(type_name("", "(+ 1 2 3 4)"), "int");
    assert_eq!(type_name("", "(- 1)"), "int");
    assert_eq!(type_name("", "(- 1 2)"), "int");
    assert_eq!(type_name("", "(* 2 3 4)"), "int");
    assert_eq!(type_name("", "(% (/ 7 2) 3)"), "int");
    assert_eq!(type_name("", "(<< 1 (>> 8 2))"), "int");
    assert_eq!(type_name("", "(~ (^ (& 1 3) (| 4 2)))"), "int");
    assert_eq!(type_name("", "(+ sizeof(int) sizeof(char*))"), "int");
  }

  #[test]
  fn arithmetic_rejects_non_integers() {
    let err = error_of("", "(* 2 true)");
    assert_eq!(err.kind(), Some(ErrorKind::Type));
    assert_eq!(err.loc(), Some(23));
    assert_eq!(error_of("", "(- 'c')").kind(), Some(ErrorKind::Type));
    assert_eq!(error_of("", "(- 1 true)").kind(), Some(ErrorKind::Type));
  }

  #[test]
  fn pointer_arithmetic() {
    assert_eq!(type_name("[int* p]", "(+ p 1)"), "int*");
    assert_eq!(type_name("[int* p]", "(+ 1 p)"), "int*");
    assert_eq!(type_name("[char** p]", "(- p 1)"), "char**");
    let err = error_of("[int* p]", "(+ p p)");
    assert!(err.message().contains("More than one pointer"), "{}", err.message());
    assert_eq!(error_of("[int* p]", "(- 1 p)").kind(), Some(ErrorKind::Type));
  }

  #[test]
  fn result_type_is_attributed_to_the_operation() {
    let ty = type_of("[int* p]", "(+ 1 p)").unwrap();
    assert_eq!(ty.loc, 26);
  }

  #[test]
  fn comparisons_and_logic() {
    assert_eq!(type_name("", "(< 1 2)"), "bool");
    assert_eq!(type_name("", "(>= 1 2)"), "bool");
    assert_eq!(type_name("", "(&& true (|| false (! true)))"), "bool");
    assert_eq!(type_name("[char* s]", "(== s \"x\")"), "bool");
    assert_eq!(type_name("", "(!= 'a' 'b')"), "bool");
    assert!(error_of("", "(== 1 'c')").message().contains("not equivalent"));
    assert_eq!(error_of("", "(! 1)").kind(), Some(ErrorKind::Type));
    assert_eq!(error_of("", "(< true false)").kind(), Some(ErrorKind::Type));
  }

  #[test]
  fn reference_and_dereference() {
    assert_eq!(type_name("[char x]", "(@ x)"), "char*");
    assert_eq!(type_name("[int** p]", "(* p)"), "int*");
    assert_eq!(type_name("[int** p]", "(@ (* p))"), "int**");
    assert_eq!(type_name("[int** p]", "(* (* p))"), "int");

    let err = error_of("", "(@ 5)");
    assert_eq!(err.kind(), Some(ErrorKind::LValue));
    assert!(err.message().contains("not an l-value"));
    assert_eq!(error_of("[int x]", "(@ (+ x 1))").kind(), Some(ErrorKind::LValue));

    assert!(error_of("[int x]", "(* x)").message().contains("not a pointer"));
    assert!(error_of("[void* v]", "(* v)").message().contains("void"));
  }

  #[test]
  fn assignment() {
    assert_eq!(type_name("[int x]", "(= x 5)"), "int");
    assert_eq!(type_name("[char* p]", "(= (* p) 'a')"), "char");
    assert_eq!(error_of("", "(= 5 1)").kind(), Some(ErrorKind::LValue));
    let err = error_of("[int x]", "(= x true)");
    assert!(err.message().contains("Cannot assign"), "{}", err.message());
    assert_eq!(error_of("[int* p, char* c]", "(= p c)").kind(), Some(ErrorKind::Type));
  }

  #[test]
  fn void_pointer_assignment_warns_only_when_narrowing() {
    let (_, warnings) = verified("[void* v, int* p] proc void f() (= p v)").unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("int*"));

    let (_, warnings) = verified("[void* v, void* w] proc void f() (= v w)").unwrap();
    assert!(warnings.is_empty());

    let err = verified("[void* v, int* p] proc void f() (= v p)").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Type));
  }

  #[test]
  fn undeclared_names() {
    let err = error_of("", "(+ y 1)");
    assert_eq!(err.kind(), Some(ErrorKind::Binding));
    assert!(err.message().contains("undeclared variable"));
    let err = error_of("", "(nowhere 1)");
    assert!(err.message().contains("undeclared procedure"));
  }

  #[test]
  fn conditions_must_be_boolean() {
    assert!(verified("proc void f() if (< 1 2) (f) else (f)").is_ok());
    let err = verified("proc void f() if 1 (f)").unwrap_err();
    assert!(err.message().contains("Condition must be a boolean"));
    assert_eq!(err.loc(), Some(17));
    assert!(verified("proc void f() while 'c' (f)").is_err());
  }

  #[test]
  fn return_types() {
    assert!(verified("proc int f() return 1").is_ok());
    assert!(verified("proc int f() return").is_ok());
    let err = verified("proc int f() return true").unwrap_err();
    assert!(err.message().contains("does not match"));
    assert_eq!(err.loc(), Some(13));
  }

  #[test]
  fn void_variables_are_rejected() {
    assert!(verified("[void g] proc void f() {}").is_err());
    assert!(verified("proc void f()[void l] {}").is_err());
    assert!(verified("proc void f(void p) {}").is_err());
    assert!(verified("[void* g] proc void f() {}").is_ok());
  }

  const PRINTF: &str = "extern int printf(char* format, etcetera)";

  #[test]
  fn variadic_calls() {
    let source = format!("{PRINTF} proc int main() (printf \"%d %c\" 1 'c')");
    assert!(verified(&source).is_ok());

    let source = format!("{PRINTF} proc int main() (printf 1)");
    let err = verified(&source).unwrap_err();
    assert!(err.message().contains("expecting type char*"), "{}", err.message());

    let source = format!("{PRINTF} proc int main() (printf)");
    let err = verified(&source).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Arity));
    assert!(err.message().contains("at least 1"));
  }

  #[test]
  fn fixed_arity_calls() {
    assert!(verified("proc int g(int a, bool b) return a proc int f() (g 1 true)").is_ok());
    let err = verified("proc int g(int a) return a proc int f() (g 1 2)").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Arity));
    let err = verified("proc int g(int a) return a proc int f() (g true)").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Type));
    assert_eq!(type_name("proc bool g() return true", "(g)"), "bool");
  }

  #[test]
  fn at_most_six_arguments() {
    let source = format!("{PRINTF} proc int main() (printf \"\" 1 2 3 4 5 6)");
    let err = verified(&source).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Arity));
    let err = verified("proc int f(int a, int b, int c, int d, int e, int f, int g) {}").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Arity));
  }

  #[test]
  fn etcetera_placement() {
    let err = verified("proc int f(int a, etcetera) {}").unwrap_err();
    assert!(err.message().contains("Internal procedures may not use etcetera"));
    let err = verified("extern int f(etcetera, int a)").unwrap_err();
    assert!(err.message().contains("only use etcetera at the end"));
    assert!(verified("extern int f(etcetera)").is_ok());
  }
}
