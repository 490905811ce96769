//! Code generation: lower the verified AST into NASM x86-64 assembly.
//!
//! The emitter is a stack machine: every expression leaves exactly one
//! 64-bit value on the stack. Statements that evaluate an expression for its
//! side effects drop that value again. Only `rax`, `rcx` and `rdx` serve as
//! scratch registers.
//!
//! Each procedure's parameters and locals form one frame addressed upward
//! from `rbp`. Globals and literal constants live in the data section and
//! are addressed RIP-relative.
//!
//! Procedure symbols carry NASM's `$` identifier prefix so names like `byte`
//! or `rax` are never read as keywords. Return and control-flow labels are
//! local (`.return`, `.WHILE_START_<n>`) to the procedure they sit in, and
//! data labels contain a `$`, so no generated label can be spelled as a
//! Caplan identifier.

use crate::ast::{
  Expression, Literal, LiteralValue, Operation, Parameter, Procedure, ProcedureKind, Program,
  Statement, Variable, VariableRef,
};
use crate::error::{CompileError, CompileResult};
use crate::operator::Operator;
use crate::ty::{SizeClass, Type, WORD_SIZE};

/// System V integer argument registers, in order.
const ARGUMENT_REGISTERS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

/// Label every `return` jumps to, local to the enclosing procedure.
const RETURN_LABEL: &str = ".return";

/// Emit the whole program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut asm = String::new();
  asm.push_str("global main\n");
  for procedure in program.procedures.iter().filter(|p| p.is_external()) {
    asm.push_str(&format!("extern {}\n", procedure_symbol(&procedure.name)));
  }

  asm.push_str("\nsection .text\n");
  let mut statics = String::new();
  for procedure in &program.procedures {
    let ProcedureKind::Internal { body, .. } = &procedure.kind else {
      continue;
    };
    let ctx = Context {
      program,
      procedure,
      frame: Frame::layout(procedure),
    };
    emit_procedure(body, &ctx, &mut asm)?;
    emit_literal_statics(body, &mut statics);
  }

  asm.push_str("\nsection .data\n");
  for global in &program.globals {
    let class = size_class(&global.ty)?;
    asm.push_str(&format!("{}: {} 0\n", global_label(&global.name), class.directive()));
  }
  asm.push_str(&statics);

  Ok(asm)
}

/// What the emitter needs while lowering one procedure body.
struct Context<'a> {
  program: &'a Program,
  procedure: &'a Procedure,
  frame: Frame,
}

/// Frame layout of one procedure.
///
/// The prologue pushes one slot per local, then one per parameter, then
/// points `rbp` at the last slot pushed. Offsets are therefore positive and
/// the first local sits highest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
  size: i64,
  locals: Vec<i64>,
  parameters: Vec<i64>,
}

impl Frame {
  fn layout(procedure: &Procedure) -> Self {
    let local_count = procedure.locals().len() as i64;
    let parameter_count = procedure.parameters.len() as i64;
    let size = WORD_SIZE * (local_count + parameter_count);

    let locals = (0..local_count).map(|i| size - WORD_SIZE * (i + 1)).collect();
    let parameters = (0..parameter_count)
      .map(|j| size - WORD_SIZE * (local_count + j + 1))
      .collect();

    let frame = Self {
      size,
      locals,
      parameters,
    };
    log::debug!(
      "frame of {}: {} bytes, locals at {:?}, parameters at {:?}",
      procedure.name,
      frame.size,
      frame.locals,
      frame.parameters
    );
    frame
  }
}

fn emit_procedure(body: &Statement, ctx: &Context, asm: &mut String) -> CompileResult<()> {
  let procedure = ctx.procedure;
  asm.push_str(&format!("{}:\n", procedure_symbol(&procedure.name)));
  asm.push_str("    push rbp\n");
  for _ in procedure.locals() {
    asm.push_str("    push qword 0\n");
  }
  for (index, parameter) in procedure.parameters.iter().enumerate() {
    let (Parameter::Variable(_), Some(register)) = (parameter, ARGUMENT_REGISTERS.get(index)) else {
      return Err(CompileError::internal(format!(
        "parameter {index} of {} has no argument register",
        procedure.name
      )));
    };
    asm.push_str(&format!("    push {register}\n"));
  }
  asm.push_str("    mov rbp, rsp\n");

  emit_stmt(body, ctx, asm)?;

  asm.push_str(&format!("{RETURN_LABEL}:\n"));
  asm.push_str("    mov rsp, rbp\n");
  if ctx.frame.size > 0 {
    asm.push_str(&format!("    add rsp, {}\n", ctx.frame.size));
  }
  asm.push_str("    pop rbp\n");
  asm.push_str("    ret\n");
  Ok(())
}

fn emit_stmt(stmt: &Statement, ctx: &Context, asm: &mut String) -> CompileResult<()> {
  match stmt {
    Statement::Multi { statements, .. } => {
      for statement in statements {
        emit_stmt(statement, ctx, asm)?;
      }
    }
    Statement::If {
      loc,
      condition,
      then_branch,
      else_branch: None,
    } => {
      let end = format!(".POST_IF_{loc}");
      emit_condition(condition, &end, ctx, asm)?;
      emit_stmt(then_branch, ctx, asm)?;
      asm.push_str(&format!("{end}:\n"));
    }
    Statement::If {
      loc,
      condition,
      then_branch,
      else_branch: Some(else_branch),
    } => {
      let otherwise = format!(".ELSE_START_{loc}");
      let end = format!(".POST_IF_ELSE_{loc}");
      emit_condition(condition, &otherwise, ctx, asm)?;
      emit_stmt(then_branch, ctx, asm)?;
      asm.push_str(&format!("    jmp {end}\n"));
      asm.push_str(&format!("{otherwise}:\n"));
      emit_stmt(else_branch, ctx, asm)?;
      asm.push_str(&format!("{end}:\n"));
    }
    Statement::While {
      loc,
      condition,
      body,
    } => {
      let start = format!(".WHILE_START_{loc}");
      let end = format!(".POST_WHILE_{loc}");
      asm.push_str(&format!("{start}:\n"));
      emit_condition(condition, &end, ctx, asm)?;
      emit_stmt(body, ctx, asm)?;
      asm.push_str(&format!("    jmp {start}\n"));
      asm.push_str(&format!("{end}:\n"));
    }
    Statement::Return { value, .. } => {
      if let Some(value) = value {
        emit_expr(value, ctx, asm)?;
        asm.push_str("    pop rax\n");
      }
      asm.push_str(&format!("    jmp {RETURN_LABEL}\n"));
    }
    Statement::Expression(expression) => {
      emit_expr(expression, ctx, asm)?;
      asm.push_str("    add rsp, 8\n");
    }
  }
  Ok(())
}

/// Evaluate a boolean and jump to `target` when it is false.
fn emit_condition(
  condition: &Expression,
  target: &str,
  ctx: &Context,
  asm: &mut String,
) -> CompileResult<()> {
  emit_expr(condition, ctx, asm)?;
  asm.push_str("    pop rax\n");
  asm.push_str("    cmp rax, 0\n");
  asm.push_str(&format!("    je {target}\n"));
  Ok(())
}

/// Emit stack-based code for a single expression.
fn emit_expr(expr: &Expression, ctx: &Context, asm: &mut String) -> CompileResult<()> {
  match expr {
    Expression::Literal(literal) => emit_literal(literal, asm),
    Expression::Variable(variable) => {
      let slot = variable_slot(variable, ctx)?;
      emit_load(&slot, &expr.ty()?, asm)
    }
    Expression::Operation(operation) => emit_operation(operation, ctx, asm),
  }
}

/// Push the address of an l-value.
fn emit_addr(expr: &Expression, ctx: &Context, asm: &mut String) -> CompileResult<()> {
  match expr {
    Expression::Variable(variable) => {
      let slot = variable_slot(variable, ctx)?;
      asm.push_str(&format!("    lea rax, [{slot}]\n"));
      asm.push_str("    push rax\n");
      Ok(())
    }
    Expression::Operation(operation) if operation.operator == Some(Operator::Dereference) => {
      let [pointer] = operation.operands.as_slice() else {
        return Err(CompileError::internal("dereference without a single operand"));
      };
      emit_expr(pointer, ctx, asm)
    }
    other => Err(CompileError::internal(format!("{other} is not an l-value"))),
  }
}

fn emit_literal(literal: &Literal, asm: &mut String) -> CompileResult<()> {
  match &literal.value {
    LiteralValue::Integer(value) => {
      if i32::try_from(*value).is_ok() {
        asm.push_str(&format!("    push {value}\n"));
      } else {
        asm.push_str(&format!("    mov rax, {value}\n"));
        asm.push_str("    push rax\n");
      }
    }
    LiteralValue::Boolean(value) => {
      asm.push_str(&format!("    push {}\n", u8::from(*value)));
    }
    LiteralValue::Character(_) => {
      let label = static_label(literal)?;
      emit_load(&format!("rel {label}"), &literal.ty(), asm)?;
    }
    LiteralValue::String(_) => {
      let label = static_label(literal)?;
      asm.push_str(&format!("    lea rax, [rel {label}]\n"));
      asm.push_str("    push rax\n");
    }
  }
  Ok(())
}

/// Load a value of type `ty` from `[address]` and push it.
fn emit_load(address: &str, ty: &Type, asm: &mut String) -> CompileResult<()> {
  let class = size_class(ty)?;
  if class.needs_clear() {
    asm.push_str("    xor rax, rax\n");
  }
  asm.push_str(&format!(
    "    mov {}, {} [{address}]\n",
    class.accumulator(),
    class.annotation()
  ));
  asm.push_str("    push rax\n");
  Ok(())
}

/// Evaluate operands so that the first one ends up on top of the stack.
fn emit_operands(operands: &[Expression], ctx: &Context, asm: &mut String) -> CompileResult<()> {
  for operand in operands.iter().rev() {
    emit_expr(operand, ctx, asm)?;
  }
  Ok(())
}

/// Fold the operands left to right with a two-register instruction.
fn emit_fold(
  operands: &[Expression],
  instruction: &str,
  ctx: &Context,
  asm: &mut String,
) -> CompileResult<()> {
  emit_operands(operands, ctx, asm)?;
  for _ in 1..operands.len() {
    asm.push_str("    pop rax\n");
    asm.push_str("    pop rcx\n");
    asm.push_str(&format!("    {instruction}\n"));
    asm.push_str("    push rax\n");
  }
  Ok(())
}

fn emit_unary(
  operands: &[Expression],
  instruction: &str,
  ctx: &Context,
  asm: &mut String,
) -> CompileResult<()> {
  emit_operands(operands, ctx, asm)?;
  asm.push_str("    pop rax\n");
  asm.push_str(&format!("    {instruction}\n"));
  asm.push_str("    push rax\n");
  Ok(())
}

fn emit_compare(
  operands: &[Expression],
  set: &str,
  ctx: &Context,
  asm: &mut String,
) -> CompileResult<()> {
  emit_operands(operands, ctx, asm)?;
  asm.push_str("    pop rdx\n");
  asm.push_str("    pop rcx\n");
  asm.push_str("    xor rax, rax\n");
  asm.push_str("    cmp rdx, rcx\n");
  asm.push_str(&format!("    {set} al\n"));
  asm.push_str("    push rax\n");
  Ok(())
}

fn emit_operation(operation: &Operation, ctx: &Context, asm: &mut String) -> CompileResult<()> {
  let Some(operator) = operation.operator else {
    return Err(CompileError::internal(format!(
      "operation at @{} reached code generation unbound",
      operation.loc
    )));
  };
  let operands = operation.operands.as_slice();

  match operator {
    Operator::Addition => emit_fold(operands, "add rax, rcx", ctx, asm),
    Operator::Subtraction => emit_fold(operands, "sub rax, rcx", ctx, asm),
    Operator::Multiplication => emit_fold(operands, "imul rax, rcx", ctx, asm),
    Operator::BitwiseAnd | Operator::LogicalAnd => emit_fold(operands, "and rax, rcx", ctx, asm),
    Operator::BitwiseOr | Operator::LogicalOr => emit_fold(operands, "or rax, rcx", ctx, asm),
    Operator::BitwiseXor => emit_fold(operands, "xor rax, rcx", ctx, asm),
    Operator::ShiftLeft => emit_fold(operands, "sal rax, cl", ctx, asm),
    Operator::ShiftRight => emit_fold(operands, "sar rax, cl", ctx, asm),
    Operator::Negation => emit_unary(operands, "neg rax", ctx, asm),
    Operator::BitwiseNot => emit_unary(operands, "not rax", ctx, asm),
    Operator::LogicalNot => emit_unary(operands, "xor rax, 1", ctx, asm),

    Operator::Division | Operator::Modulus => {
      emit_operands(operands, ctx, asm)?;
      asm.push_str("    pop rax\n");
      asm.push_str("    pop rcx\n");
      asm.push_str("    cqo\n");
      asm.push_str("    idiv rcx\n");
      if operator == Operator::Modulus {
        asm.push_str("    push rdx\n");
      } else {
        asm.push_str("    push rax\n");
      }
      Ok(())
    }

    Operator::Equality => emit_compare(operands, "sete", ctx, asm),
    Operator::NotEquality => emit_compare(operands, "setne", ctx, asm),
    Operator::LessThan => emit_compare(operands, "setl", ctx, asm),
    Operator::LessThanEquals => emit_compare(operands, "setle", ctx, asm),
    Operator::GreaterThan => emit_compare(operands, "setg", ctx, asm),
    Operator::GreaterThanEquals => emit_compare(operands, "setge", ctx, asm),

    Operator::Dereference => {
      emit_operands(operands, ctx, asm)?;
      asm.push_str("    pop rcx\n");
      let ty = operation
        .ty
        .as_ref()
        .ok_or_else(|| CompileError::internal("dereference has no type"))?;
      emit_load("rcx", ty, asm)
    }

    Operator::Reference => {
      let [operand] = operands else {
        return Err(CompileError::internal("reference without a single operand"));
      };
      emit_addr(operand, ctx, asm)
    }

    Operator::Assignment => {
      let [target, value] = operands else {
        return Err(CompileError::internal("assignment without two operands"));
      };
      emit_expr(value, ctx, asm)?;
      emit_addr(target, ctx, asm)?;
      let class = size_class(&target.ty()?)?;
      asm.push_str("    pop rcx\n");
      asm.push_str("    pop rax\n");
      asm.push_str(&format!(
        "    mov {} [rcx], {}\n",
        class.annotation(),
        class.accumulator()
      ));
      asm.push_str("    push rax\n");
      Ok(())
    }

    Operator::Call { callee } => {
      let callee = callee
        .and_then(|index| ctx.program.procedures.get(index))
        .ok_or_else(|| CompileError::internal(format!("call to {} is unbound", operation.token.text)))?;
      emit_call(callee, operands, ctx, asm)
    }
  }
}

/// Arguments go into the System V registers; `rsp` is aligned to 16 bytes
/// around the call and restored from the copy saved on the aligned stack.
fn emit_call(
  callee: &Procedure,
  arguments: &[Expression],
  ctx: &Context,
  asm: &mut String,
) -> CompileResult<()> {
  if arguments.len() > ARGUMENT_REGISTERS.len() {
    return Err(CompileError::internal(format!(
      "call to {} passes {} arguments",
      callee.name,
      arguments.len()
    )));
  }

  emit_operands(arguments, ctx, asm)?;
  for register in &ARGUMENT_REGISTERS[..arguments.len()] {
    asm.push_str(&format!("    pop {register}\n"));
  }

  asm.push_str("    mov r10, rsp\n");
  asm.push_str("    and rsp, -16\n");
  asm.push_str("    push r10\n");
  asm.push_str("    push r10\n");
  if callee.is_variadic() {
    asm.push_str("    mov rax, 0\n");
  }
  asm.push_str(&format!("    call {}\n", procedure_symbol(&callee.name)));
  asm.push_str("    pop rsp\n");
  if callee.return_type.size_class() == Some(SizeClass::Byte) {
    asm.push_str("    movzx rax, al\n");
  }
  asm.push_str("    push rax\n");
  Ok(())
}

fn emit_literal_statics(stmt: &Statement, statics: &mut String) {
  match stmt {
    Statement::Multi { statements, .. } => {
      for statement in statements {
        emit_literal_statics(statement, statics);
      }
    }
    Statement::If {
      condition,
      then_branch,
      else_branch,
      ..
    } => {
      emit_expr_statics(condition, statics);
      emit_literal_statics(then_branch, statics);
      if let Some(else_branch) = else_branch {
        emit_literal_statics(else_branch, statics);
      }
    }
    Statement::While {
      condition, body, ..
    } => {
      emit_expr_statics(condition, statics);
      emit_literal_statics(body, statics);
    }
    Statement::Return { value, .. } => {
      if let Some(value) = value {
        emit_expr_statics(value, statics);
      }
    }
    Statement::Expression(expression) => emit_expr_statics(expression, statics),
  }
}

fn emit_expr_statics(expr: &Expression, statics: &mut String) {
  match expr {
    Expression::Literal(literal) => {
      let Some(label) = literal.static_label() else {
        return;
      };
      match &literal.value {
        LiteralValue::Character(value) => statics.push_str(&format!("{label}: db {value}\n")),
        LiteralValue::String(bytes) => {
          let mut data: Vec<String> = bytes.iter().map(u8::to_string).collect();
          data.push("0".to_string());
          statics.push_str(&format!("{label}: db {}\n", data.join(", ")));
        }
        LiteralValue::Integer(_) | LiteralValue::Boolean(_) => {}
      }
    }
    Expression::Variable(_) => {}
    Expression::Operation(operation) => {
      for operand in &operation.operands {
        emit_expr_statics(operand, statics);
      }
    }
  }
}

/// Memory operand (without brackets) holding a bound variable.
fn variable_slot(variable: &Variable, ctx: &Context) -> CompileResult<String> {
  let slot = match variable.binding {
    Some(VariableRef::Global(index)) => ctx
      .program
      .globals
      .get(index)
      .map(|global| format!("rel {}", global_label(&global.name))),
    Some(VariableRef::Local(index)) => ctx.frame.locals.get(index).map(|offset| format!("rbp + {offset}")),
    Some(VariableRef::Parameter(index)) => ctx
      .frame
      .parameters
      .get(index)
      .map(|offset| format!("rbp + {offset}")),
    None => None,
  };
  slot.ok_or_else(|| {
    CompileError::internal(format!(
      "variable {} at @{} has no storage",
      variable.name, variable.loc
    ))
  })
}

fn procedure_symbol(name: &str) -> String {
  format!("${name}")
}

fn global_label(name: &str) -> String {
  format!("{name}$global")
}

fn static_label(literal: &Literal) -> CompileResult<String> {
  literal
    .static_label()
    .ok_or_else(|| CompileError::internal("literal has no static storage"))
}

fn size_class(ty: &Type) -> CompileResult<SizeClass> {
  ty.size_class()
    .ok_or_else(|| CompileError::internal(format!("type {ty} has no storage size")))
}
