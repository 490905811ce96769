//! The language's types: `int`, `char`, `bool`, `void` and pointers to any of
//! them. A type remembers where it was written (or which operator produced
//! it) for diagnostics, but that position never takes part in equality.

use std::fmt;

/// Bytes in a machine word; also the size of `int` and of every pointer.
pub const WORD_SIZE: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
  Int,
  Char,
  Bool,
  Void,
  Ptr(Box<Type>),
}

#[derive(Debug, Clone)]
pub struct Type {
  pub kind: TypeKind,
  pub loc: usize,
}

/// Operand width as written in assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
  Byte,
  Word,
  Dword,
  Qword,
}

impl SizeClass {
  fn from_size(size: i64) -> Option<Self> {
    match size {
      1 => Some(Self::Byte),
      2 => Some(Self::Word),
      4 => Some(Self::Dword),
      8 => Some(Self::Qword),
      _ => None,
    }
  }

  /// Memory operand annotation, e.g. `byte` in `mov byte [rcx], al`.
  pub fn annotation(self) -> &'static str {
    match self {
      Self::Byte => "byte",
      Self::Word => "word",
      Self::Dword => "dword",
      Self::Qword => "qword",
    }
  }

  /// Data reservation directive for a static of this width.
  pub fn directive(self) -> &'static str {
    match self {
      Self::Byte => "db",
      Self::Word => "dw",
      Self::Dword => "dd",
      Self::Qword => "dq",
    }
  }

  /// The accumulator register at this width.
  pub fn accumulator(self) -> &'static str {
    match self {
      Self::Byte => "al",
      Self::Word => "ax",
      Self::Dword => "eax",
      Self::Qword => "rax",
    }
  }

  /// Narrower-than-dword writes leave the upper bits of the register intact.
  pub fn needs_clear(self) -> bool {
    matches!(self, Self::Byte | Self::Word)
  }
}

impl Type {
  pub fn int(loc: usize) -> Self {
    Self::new(TypeKind::Int, loc)
  }

  pub fn char(loc: usize) -> Self {
    Self::new(TypeKind::Char, loc)
  }

  pub fn bool(loc: usize) -> Self {
    Self::new(TypeKind::Bool, loc)
  }

  pub fn void(loc: usize) -> Self {
    Self::new(TypeKind::Void, loc)
  }

  pub fn pointer_to(base: Type, loc: usize) -> Self {
    Self::new(TypeKind::Ptr(Box::new(base)), loc)
  }

  fn new(kind: TypeKind, loc: usize) -> Self {
    Self { kind, loc }
  }

  /// Copy of this type attributed to another source position.
  pub fn duplicate_at(&self, loc: usize) -> Self {
    Self {
      kind: self.kind.clone(),
      loc,
    }
  }

  pub fn is_integer(&self) -> bool {
    matches!(self.kind, TypeKind::Int)
  }

  pub fn is_bool(&self) -> bool {
    matches!(self.kind, TypeKind::Bool)
  }

  pub fn is_void(&self) -> bool {
    matches!(self.kind, TypeKind::Void)
  }

  pub fn is_pointer(&self) -> bool {
    matches!(self.kind, TypeKind::Ptr(_))
  }

  /// The pointed-to type, if this is a pointer.
  pub fn base(&self) -> Option<&Type> {
    match &self.kind {
      TypeKind::Ptr(base) => Some(base),
      _ => None,
    }
  }

  /// Size in bytes; `void` has none.
  pub fn size(&self) -> Option<i64> {
    match self.kind {
      TypeKind::Int | TypeKind::Ptr(_) => Some(WORD_SIZE),
      TypeKind::Char | TypeKind::Bool => Some(1),
      TypeKind::Void => None,
    }
  }

  pub fn size_class(&self) -> Option<SizeClass> {
    self.size().and_then(SizeClass::from_size)
  }
}

impl PartialEq for Type {
  fn eq(&self, other: &Self) -> bool {
    self.kind == other.kind
  }
}

impl Eq for Type {}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      TypeKind::Int => f.write_str("int"),
      TypeKind::Char => f.write_str("char"),
      TypeKind::Bool => f.write_str("bool"),
      TypeKind::Void => f.write_str("void"),
      TypeKind::Ptr(base) => write!(f, "{base}*"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn equality_ignores_position() {
    assert_eq!(Type::int(1), Type::int(99));
    assert_ne!(Type::int(1), Type::char(1));
    assert_eq!(
      Type::pointer_to(Type::char(0), 1),
      Type::pointer_to(Type::char(7), 8)
    );
    assert_ne!(
      Type::pointer_to(Type::char(0), 1),
      Type::pointer_to(Type::pointer_to(Type::char(0), 1), 2)
    );
  }

  #[test]
  fn duplicate_keeps_shape() {
    let original = Type::pointer_to(Type::pointer_to(Type::bool(0), 1), 2);
    let moved = original.duplicate_at(40);
    assert_eq!(moved.loc, 40);
    assert_eq!(moved, original);
    assert_eq!(moved.duplicate_at(2), original);
    assert_eq!(original.loc, 2);
  }

  #[test]
  fn sizes_and_classes() {
    assert_eq!(Type::int(0).size(), Some(8));
    assert_eq!(Type::char(0).size_class(), Some(SizeClass::Byte));
    assert_eq!(Type::bool(0).size(), Some(1));
    assert_eq!(Type::void(0).size(), None);
    let ptr = Type::pointer_to(Type::void(0), 0);
    assert_eq!(ptr.size_class(), Some(SizeClass::Qword));
    assert_eq!(ptr.size_class().map(SizeClass::accumulator), Some("rax"));
    assert!(SizeClass::Byte.needs_clear());
    assert!(!SizeClass::Qword.needs_clear());
  }

  #[test]
  fn display() {
    let ty = Type::pointer_to(Type::pointer_to(Type::int(0), 0), 0);
    assert_eq!(ty.to_string(), "int**");
    assert_eq!(ty.base().map(ToString::to_string).as_deref(), Some("int*"));
  }
}
