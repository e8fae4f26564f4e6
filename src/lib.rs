pub mod ast;
pub mod compiler;
pub mod disassembler;
pub mod lexer;
pub mod reader;
pub mod runtime;
pub mod world;

pub use ast::Ast;
pub use compiler::{CodeUnit, CompileError, Compiler};
pub use reader::{read, read_program, ReadError};
pub use runtime::{vm::Vm, RuntimeError, VmConfig};
pub use world::{fuel::Fuel, value, Globals};

/// Anything that can go wrong going from source text to a value
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
