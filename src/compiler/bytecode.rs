//! Bytecode opcode definitions.
//!
//! Opcode values are shared by the compiler, the disassembler and the virtual
//! machine; every one of them must know how to handle each variant here.
use core::fmt;

use arbitrary::Arbitrary;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Stops the program, returning the top of the stack
    Halt = 0x00,
    /// `CONST idx`: pushes a constant from the pool
    Const = 0x01,

    Add = 0x02,
    Sub = 0x03,
    Mul = 0x04,
    Div = 0x05,
    Mod = 0x06,
    /// `COMPARE cmp`: see [`Comparator`]
    Compare = 0x07,

    /// `JMP_IF_FALSE hi lo`: pops a boolean, jumps to the absolute address if false
    JmpIfFalse = 0x08,
    /// `JMP hi lo`
    Jmp = 0x09,

    GetGlobal = 0x0A,
    /// leaves the written value on the stack
    SetGlobal = 0x0B,

    Pop = 0x0C,

    GetLocal = 0x0D,
    /// leaves the written value on the stack
    SetLocal = 0x0E,

    /// `SCOPE_EXIT n`: drops the `n` values beneath the top of the stack
    ScopeExit = 0x0F,
}

impl OpCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Halt,
            0x01 => Self::Const,
            0x02 => Self::Add,
            0x03 => Self::Sub,
            0x04 => Self::Mul,
            0x05 => Self::Div,
            0x06 => Self::Mod,
            0x07 => Self::Compare,
            0x08 => Self::JmpIfFalse,
            0x09 => Self::Jmp,
            0x0A => Self::GetGlobal,
            0x0B => Self::SetGlobal,
            0x0C => Self::Pop,
            0x0D => Self::GetLocal,
            0x0E => Self::SetLocal,
            0x0F => Self::ScopeExit,
            _ => return None,
        })
    }

    /// How many operand bytes follow the opcode
    pub fn operand_len(self) -> usize {
        match self {
            Self::Halt
            | Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Mod
            | Self::Pop => 0,
            Self::Const
            | Self::Compare
            | Self::GetGlobal
            | Self::SetGlobal
            | Self::GetLocal
            | Self::SetLocal
            | Self::ScopeExit => 1,
            Self::JmpIfFalse | Self::Jmp => 2,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Halt => "HALT",
            Self::Const => "CONST",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Compare => "COMPARE",
            Self::JmpIfFalse => "JMP_IF_FALSE",
            Self::Jmp => "JMP",
            Self::GetGlobal => "GET_GLOBAL",
            Self::SetGlobal => "SET_GLOBAL",
            Self::Pop => "POP",
            Self::GetLocal => "GET_LOCAL",
            Self::SetLocal => "SET_LOCAL",
            Self::ScopeExit => "SCOPE_EXIT",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// The 1-byte operand of [`OpCode::Compare`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum Comparator {
    Less = 0,
    Greater = 1,
    Equal = 2,
    LessEqual = 3,
    GreaterEqual = 4,
    NotEqual = 5,
}

impl Comparator {
    pub const ALL: [Comparator; 6] = [
        Self::Less,
        Self::Greater,
        Self::Equal,
        Self::LessEqual,
        Self::GreaterEqual,
        Self::NotEqual,
    ];

    pub fn from_u8(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmp| cmp.symbol() == symbol)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::Greater => ">",
            Self::Equal => "==",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::NotEqual => "!=",
        }
    }

    pub fn apply<T: PartialOrd + ?Sized>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Less => lhs < rhs,
            Self::Greater => lhs > rhs,
            Self::Equal => lhs == rhs,
            Self::LessEqual => lhs <= rhs,
            Self::GreaterEqual => lhs >= rhs,
            Self::NotEqual => lhs != rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::{Comparator, OpCode};

    #[test]
    fn opcode_bytes_are_dense() {
        let decoded = (0..=u8::MAX).filter_map(OpCode::from_u8).collect::<Vec<_>>();
        check!(decoded.len() == 16);
        for (byte, op) in decoded.into_iter().enumerate() {
            check!(op as usize == byte);
        }
    }

    #[test]
    fn comparator_codes_follow_declaration_order() {
        let symbols = Comparator::ALL.map(Comparator::symbol);
        check!(symbols == ["<", ">", "==", "<=", ">=", "!="]);
        for cmp in Comparator::ALL {
            check!(Comparator::from_u8(cmp as u8) == Some(cmp));
            check!(Comparator::from_symbol(cmp.symbol()) == Some(cmp));
        }
        check!(Comparator::from_u8(6).is_none());
        check!(Comparator::from_symbol("=").is_none());
    }

    #[test]
    fn comparisons() {
        check!(Comparator::Less.apply(&1.0, &2.0));
        check!(!Comparator::GreaterEqual.apply(&1.0, &2.0));
        check!(Comparator::NotEqual.apply("a", "b"));
        check!(Comparator::LessEqual.apply("abc", "abd"));
        // NaN is unordered with everything, including itself
        check!(!Comparator::Equal.apply(&f64::NAN, &f64::NAN));
        check!(Comparator::NotEqual.apply(&f64::NAN, &f64::NAN));
    }
}
