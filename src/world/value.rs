//! Representation of Jelly values
use core::fmt;
use std::rc::Rc;

use crate::compiler::CodeUnit;

/// Type that stores all possible values!
///
/// Values are cheap to copy between stack slots, constants and globals: heap
/// payloads are shared through an [`Rc`], so a string or code unit lives as
/// long as the last value pointing at it.
#[derive(Clone, Debug)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Object(Rc<Object>),
}

/// Heap payloads referenced from a [`Value::Object`]
#[derive(Debug, PartialEq)]
pub enum Object {
    String(Box<str>),
    // a compiled unit can be stored as a constant of another unit
    Code(CodeUnit),
}

/// The variant tag of a value, as seen by type checks and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Boolean,
    String,
    Code,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => write!(f, "NUMBER"),
            ValueKind::Boolean => write!(f, "BOOLEAN"),
            ValueKind::String => write!(f, "STRING"),
            ValueKind::Code => write!(f, "CODE"),
        }
    }
}

/// A typed accessor was used against a value of another kind
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("type mismatch: expected {expected}, found {found}")]
pub struct TypeMismatch {
    pub expected: ValueKind,
    pub found: ValueKind,
}

impl Value {
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    pub fn boolean(value: bool) -> Self {
        Self::Boolean(value)
    }

    pub fn string(value: impl AsRef<str>) -> Self {
        Self::Object(Rc::new(Object::String(Box::from(value.as_ref()))))
    }

    pub fn code(unit: CodeUnit) -> Self {
        Self::Object(Rc::new(Object::Code(unit)))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Object(obj) => match obj.as_ref() {
                Object::String(_) => ValueKind::String,
                Object::Code(_) => ValueKind::Code,
            },
        }
    }

    pub fn is_number(&self) -> bool {
        self.kind() == ValueKind::Number
    }

    pub fn is_boolean(&self) -> bool {
        self.kind() == ValueKind::Boolean
    }

    pub fn is_string(&self) -> bool {
        self.kind() == ValueKind::String
    }

    pub fn is_code(&self) -> bool {
        self.kind() == ValueKind::Code
    }

    fn mismatch(&self, expected: ValueKind) -> TypeMismatch {
        TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_number(&self) -> Result<f64, TypeMismatch> {
        match self {
            Self::Number(n) => Ok(*n),
            _ => Err(self.mismatch(ValueKind::Number)),
        }
    }

    pub fn as_boolean(&self) -> Result<bool, TypeMismatch> {
        match self {
            Self::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch(ValueKind::Boolean)),
        }
    }

    pub fn as_str(&self) -> Result<&str, TypeMismatch> {
        match self {
            Self::Object(obj) => match obj.as_ref() {
                Object::String(s) => Ok(s),
                Object::Code(_) => Err(self.mismatch(ValueKind::String)),
            },
            _ => Err(self.mismatch(ValueKind::String)),
        }
    }

    pub fn as_code(&self) -> Result<&CodeUnit, TypeMismatch> {
        match self {
            Self::Object(obj) => match obj.as_ref() {
                Object::Code(unit) => Ok(unit),
                Object::String(_) => Err(self.mismatch(ValueKind::Code)),
            },
            _ => Err(self.mismatch(ValueKind::Code)),
        }
    }

    /// Whether two values may share one constant pool slot.
    ///
    /// Numbers compare bitwise so `0` and `-0` stay distinct constants.
    pub fn same_constant(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

// Structural: object identity never matters, only kind and content.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Object(obj) => match obj.as_ref() {
                Object::String(s) => write!(f, "{s:?}"),
                Object::Code(unit) => write!(f, "<code {}>", unit.name()),
            },
        }
    }
}
