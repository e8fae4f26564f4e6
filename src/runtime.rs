//! runtimes are responsible for executing compiled code units against the
//! globals of a world

use crate::{
    compiler::OpCode,
    value::{TypeMismatch, ValueKind},
    world::UnknownGlobal,
};

pub mod stack;
pub mod vm;

pub use stack::StackFault;

/// Default number of values the stack can hold
pub const STACK_LIMIT: usize = 512;

/// Failures while executing bytecode.
///
/// Execution stops at the first one; the stack is reset before the next run.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("stack fault: {0}")]
    StackFault(#[from] StackFault),
    #[error("unknown opcode 0x{opcode:02X} at {offset:04X}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("bytecode ends in the middle of an instruction at {0:04X}")]
    UnexpectedEnd(usize),
    #[error("unknown constant: {0}")]
    UnknownConstant(usize),
    #[error("unknown comparator: {0}")]
    UnknownComparator(u8),
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
    #[error(transparent)]
    UnknownGlobal(#[from] UnknownGlobal),
    #[error("cannot {op} {left} and {right}")]
    InvalidOperands {
        op: OpCode,
        left: ValueKind,
        right: ValueKind,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("out of fuel")]
    OutOfFuel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// how many values the stack holds before overflowing
    pub stack_capacity: usize,
    /// instruction budget for one run, unlimited if `None`
    pub fuel: Option<i32>,
    /// log the disassembly of every compiled unit
    pub disassemble: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_capacity: STACK_LIMIT,
            fuel: None,
            disassemble: false,
        }
    }
}
