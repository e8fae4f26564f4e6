//! Turns a [`CodeUnit`] back into a readable listing.
//!
//! Decoding is separate from rendering: [`disassemble`] produces structured
//! [`Instruction`]s, and [`Disassembly`]'s `Display` lays them out one per line
//! as `offset  bytes  mnemonic  operand`.
use core::fmt;

use crate::{
    compiler::{CodeUnit, Comparator, OpCode},
    value::Value,
    world::Globals,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DisassembleError {
    #[error("unknown opcode 0x{opcode:02X} at {offset:04X}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("{opcode} at {offset:04X} is missing its operand")]
    Truncated { opcode: OpCode, offset: usize },
    #[error("constant {index} at {offset:04X} is not in the pool")]
    UnknownConstant { index: u8, offset: usize },
    #[error("global {index} at {offset:04X} does not exist")]
    UnknownGlobal { index: u8, offset: usize },
    #[error("unknown comparator {code} at {offset:04X}")]
    UnknownComparator { code: u8, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Constant { index: u8, value: Value },
    Global { index: u8, name: Box<str> },
    Local(u8),
    Comparator(Comparator),
    Address(u16),
    /// how many values `SCOPE_EXIT` drops
    Count(u8),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Constant { index, value } => write!(f, "{index} ({value})"),
            Operand::Global { index, name } => write!(f, "{index} ({name})"),
            Operand::Local(slot) => write!(f, "{slot}"),
            Operand::Comparator(cmp) => write!(f, "{} ({})", *cmp as u8, cmp.symbol()),
            Operand::Address(addr) => write!(f, "{addr:04X}"),
            Operand::Count(count) => write!(f, "{count}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    /// the opcode byte followed by its operand bytes
    pub bytes: Box<[u8]>,
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction {
    /// Offset of the instruction that follows this one
    pub fn next_offset(&self) -> usize {
        self.offset + self.bytes.len()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self
            .bytes
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        let line = format!(
            "{:04X}    {:<12}{:<20} {}",
            self.offset,
            bytes,
            self.opcode.mnemonic(),
            self.operand
        );
        write!(f, "{}", line.trim_end())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disassembly {
    pub name: Box<str>,
    pub instructions: Vec<Instruction>,
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------- Disassembly: {} ----------", self.name)?;
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}

/// Decodes every instruction of `unit`, resolving global names through `globals`
pub fn disassemble(unit: &CodeUnit, globals: &Globals) -> Result<Disassembly, DisassembleError> {
    let code = unit.code();
    let mut instructions = vec![];
    let mut offset = 0;

    while offset < code.len() {
        let instruction = decode(unit, globals, offset)?;
        offset = instruction.next_offset();
        instructions.push(instruction);
    }

    Ok(Disassembly {
        name: Box::from(unit.name()),
        instructions,
    })
}

fn decode(unit: &CodeUnit, globals: &Globals, offset: usize) -> Result<Instruction, DisassembleError> {
    let code = unit.code();
    let byte = code[offset];
    let opcode = OpCode::from_u8(byte).ok_or(DisassembleError::UnknownOpcode {
        opcode: byte,
        offset,
    })?;
    let bytes = code
        .get(offset..offset + 1 + opcode.operand_len())
        .ok_or(DisassembleError::Truncated { opcode, offset })?;

    let operand = match (opcode, bytes) {
        (
            OpCode::Halt
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pop,
            _,
        ) => Operand::None,
        (OpCode::Const, &[_, index]) => {
            let value = unit
                .constant(usize::from(index))
                .cloned()
                .ok_or(DisassembleError::UnknownConstant { index, offset })?;
            Operand::Constant { index, value }
        }
        (OpCode::GetGlobal | OpCode::SetGlobal, &[_, index]) => {
            let name = globals
                .name(usize::from(index))
                .map_err(|_| DisassembleError::UnknownGlobal { index, offset })?;
            Operand::Global {
                index,
                name: Box::from(name),
            }
        }
        (OpCode::GetLocal | OpCode::SetLocal, &[_, slot]) => Operand::Local(slot),
        (OpCode::Compare, &[_, code]) => Operand::Comparator(
            Comparator::from_u8(code).ok_or(DisassembleError::UnknownComparator { code, offset })?,
        ),
        (OpCode::JmpIfFalse | OpCode::Jmp, &[_, hi, lo]) => {
            Operand::Address(u16::from_be_bytes([hi, lo]))
        }
        (OpCode::ScopeExit, &[_, count]) => Operand::Count(count),
        // operand_len and the patterns above disagree
        _ => return Err(DisassembleError::Truncated { opcode, offset }),
    };

    Ok(Instruction {
        offset,
        bytes: Box::from(bytes),
        opcode,
        operand,
    })
}
