//! Compile Jelly code into bytecode
//! to execute!
//!
//! For example:
//!
//! ```text
//! (var x 3)
//! (if (> x 1) "big" "small")
//! ```
//!
//! compiles to
//!
//! ```text
//! 0000    01 00       CONST                0 (3)
//! 0002    0B 03       SET_GLOBAL           3 (x)
//! 0004    0C          POP
//! 0005    0A 03       GET_GLOBAL           3 (x)
//! 0007    01 01       CONST                1 (1)
//! 0009    07 01       COMPARE              1 (>)
//! 000B    08 00 13    JMP_IF_FALSE         0013
//! 000E    01 02       CONST                2 ("big")
//! 0010    09 00 15    JMP                  0015
//! 0013    01 03       CONST                3 ("small")
//! 0015    00          HALT
//! ```
//!
//! Every expression leaves exactly one value on the stack. Forms that have
//! nothing useful to produce (a missing else branch, a finished loop, an empty
//! block) leave `false`.

pub mod bytecode;
pub mod code_unit;
pub mod environment;

use crate::{ast::Ast, value::Value, world::Globals};

pub use bytecode::{Comparator, OpCode};
pub use code_unit::{CodeUnit, LocalVar};
use code_unit::PatchSite;
use environment::{Binding, Environment};

/// Blocks at or above this depth declare globals
const GLOBAL_SCOPE: usize = 1;

/// How deep forms may nest before compilation gives up
pub const MAX_NESTING: usize = 256;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unresolved reference: {0}")]
    UnresolvedReference(Box<str>),
    #[error("cannot compile an empty list")]
    EmptyList,
    #[error("expected a symbol at the head of a form, found {0}")]
    InvalidHead(Box<str>),
    #[error("unknown form: {0}")]
    UnknownForm(Box<str>),
    #[error("malformed `{form}`: {reason}")]
    Malformed { form: Box<str>, reason: String },
    #[error("more than 256 constants in one code unit")]
    TooManyConstants,
    #[error("more than 256 globals")]
    TooManyGlobals,
    #[error("more than 256 locals in one code unit")]
    TooManyLocals,
    #[error("jump target {0:#06X} does not fit in two bytes")]
    JumpOutOfRange(usize),
    #[error("forms nested more than {0} deep")]
    TooDeep(usize),
}

impl CompileError {
    fn malformed(form: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            form: Box::from(form),
            reason: reason.into(),
        }
    }
}

fn expect_operands<'a, const N: usize>(
    form: &str,
    args: &'a [Ast],
) -> Result<&'a [Ast; N], CompileError> {
    args.try_into().map_err(|_| {
        CompileError::malformed(
            form,
            format!("expected {N} operands, found {}", args.len()),
        )
    })
}

fn variable_name<'a>(form: &str, node: &'a Ast) -> Result<&'a str, CompileError> {
    match node.as_symbol() {
        Some("true" | "false") => Err(CompileError::malformed(form, "cannot bind a boolean")),
        Some(name) => Ok(name),
        None => Err(CompileError::malformed(
            form,
            format!("variable name must be a symbol, found {node}"),
        )),
    }
}

fn jump_target(offset: usize) -> Result<u16, CompileError> {
    u16::try_from(offset).map_err(|_| CompileError::JumpOutOfRange(offset))
}

/// Whether an expression's value is consumed by an enclosing form, or it is a
/// statement of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Operand,
    Statement,
}

/// Lowers a program tree into a single [`CodeUnit`].
///
/// Global declarations are registered in the table the compiler borrows, so
/// later compilations (and the VM running the result) see them.
pub struct Compiler<'g> {
    globals: &'g mut Globals,
    unit: CodeUnit,
    /// values on the stack at the current point of the code, locals included
    height: usize,
    /// forms currently being lowered
    nesting: usize,
}

impl<'g> Compiler<'g> {
    pub fn new(globals: &'g mut Globals) -> Self {
        Self::named(globals, "main")
    }

    pub fn named(globals: &'g mut Globals, name: impl AsRef<str>) -> Self {
        Self {
            globals,
            unit: CodeUnit::new(name),
            height: 0,
            nesting: 0,
        }
    }

    /// Compiles `program`, terminating the unit with `HALT`.
    ///
    /// On failure nothing is kept: globals the program would have declared are
    /// removed from the table again.
    pub fn compile(mut self, program: &Ast) -> Result<CodeUnit, CompileError> {
        let globals_before = self.globals.len();
        if let Err(err) = self.gen_expr(program) {
            self.globals.truncate(globals_before);
            tracing::debug!(%err, "compilation failed");
            return Err(err);
        }
        self.emit(OpCode::Halt);

        tracing::debug!(
            unit = self.unit.name(),
            bytes = self.unit.code().len(),
            constants = self.unit.constants().len(),
            globals = self.globals.len(),
            "compiled"
        );
        Ok(self.unit)
    }

    fn is_global_scope(&self) -> bool {
        self.unit.scope_depth() <= GLOBAL_SCOPE
    }

    /// Follows what `op` does to the height of the stack
    fn track(&mut self, op: OpCode, operand: u8) {
        self.height = match op {
            OpCode::Const | OpCode::GetGlobal | OpCode::GetLocal => self.height + 1,
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Compare
            | OpCode::JmpIfFalse
            | OpCode::Pop => self.height.saturating_sub(1),
            OpCode::ScopeExit => self.height.saturating_sub(usize::from(operand)),
            OpCode::SetGlobal | OpCode::SetLocal | OpCode::Jmp | OpCode::Halt => self.height,
        };
    }

    fn emit(&mut self, op: OpCode) {
        self.unit.emit_op(op);
        self.track(op, 0);
    }

    fn emit_with(&mut self, op: OpCode, operand: u8) {
        self.unit.emit_op(op);
        self.unit.emit(operand);
        self.track(op, operand);
    }

    fn emit_jump(&mut self, op: OpCode) -> PatchSite {
        self.track(op, 0);
        self.unit.emit_jump(op)
    }

    fn emit_jump_to(&mut self, op: OpCode, target: u16) {
        self.track(op, 0);
        self.unit.emit_jump_to(op, target);
    }

    fn patch_here(&mut self, site: PatchSite) -> Result<(), CompileError> {
        let target = jump_target(self.unit.offset())?;
        self.unit.patch(site, target);
        Ok(())
    }

    fn gen_expr(&mut self, exp: &Ast) -> Result<(), CompileError> {
        self.gen_node(exp, Position::Operand)
    }

    fn gen_node(&mut self, exp: &Ast, position: Position) -> Result<(), CompileError> {
        if self.nesting >= MAX_NESTING {
            return Err(CompileError::TooDeep(MAX_NESTING));
        }
        self.nesting += 1;
        let result = match exp {
            Ast::Number(n) => self.gen_const(Value::Number(*n)),
            Ast::String(s) => self.gen_const(Value::string(s)),
            Ast::Symbol(name) => match name.as_ref() {
                "true" => self.gen_const(Value::Boolean(true)),
                "false" => self.gen_const(Value::Boolean(false)),
                name => self.gen_get(name),
            },
            Ast::List(list) => self.gen_list(list, position),
        };
        self.nesting -= 1;
        result
    }

    fn gen_const(&mut self, value: Value) -> Result<(), CompileError> {
        let index = self.unit.constant_index(value);
        let index = u8::try_from(index).map_err(|_| CompileError::TooManyConstants)?;
        self.emit_with(OpCode::Const, index);
        Ok(())
    }

    /// The value of forms that have none
    fn gen_nothing(&mut self) -> Result<(), CompileError> {
        self.gen_const(Value::Boolean(false))
    }

    fn resolve(&self, name: &str) -> Result<Binding, CompileError> {
        Environment::new(&self.unit, &*self.globals)
            .get(name)
            .ok_or_else(|| CompileError::UnresolvedReference(Box::from(name)))
    }

    fn gen_get(&mut self, name: &str) -> Result<(), CompileError> {
        match self.resolve(name)? {
            Binding::Local(slot) => self.gen_local(OpCode::GetLocal, slot),
            Binding::Global(index) => self.gen_global(OpCode::GetGlobal, index),
        }
    }

    fn gen_local(&mut self, op: OpCode, slot: usize) -> Result<(), CompileError> {
        let slot = u8::try_from(slot).map_err(|_| CompileError::TooManyLocals)?;
        self.emit_with(op, slot);
        Ok(())
    }

    fn gen_global(&mut self, op: OpCode, index: usize) -> Result<(), CompileError> {
        let index = u8::try_from(index).map_err(|_| CompileError::TooManyGlobals)?;
        self.emit_with(op, index);
        Ok(())
    }

    fn gen_list(&mut self, list: &[Ast], position: Position) -> Result<(), CompileError> {
        let Some((head, args)) = list.split_first() else {
            return Err(CompileError::EmptyList);
        };
        let Some(tag) = head.as_symbol() else {
            return Err(CompileError::InvalidHead(head.to_string().into()));
        };

        match tag {
            "+" => self.gen_binary(OpCode::Add, tag, args),
            "-" => self.gen_binary(OpCode::Sub, tag, args),
            "*" => self.gen_binary(OpCode::Mul, tag, args),
            "/" => self.gen_binary(OpCode::Div, tag, args),
            "%" => self.gen_binary(OpCode::Mod, tag, args),
            "if" => self.gen_if(args),
            "while" => self.gen_while(args),
            "for" => self.gen_for(args, position),
            "var" => self.gen_var(args, position),
            "set" => self.gen_set(args),
            "begin" => self.gen_block(args),
            _ => match Comparator::from_symbol(tag) {
                Some(cmp) => self.gen_compare(cmp, args),
                None => Err(CompileError::UnknownForm(Box::from(tag))),
            },
        }
    }

    fn gen_binary(&mut self, op: OpCode, tag: &str, args: &[Ast]) -> Result<(), CompileError> {
        let [lhs, rhs] = expect_operands::<2>(tag, args)?;
        self.gen_expr(lhs)?;
        self.gen_expr(rhs)?;
        self.emit(op);
        Ok(())
    }

    fn gen_compare(&mut self, cmp: Comparator, args: &[Ast]) -> Result<(), CompileError> {
        let [lhs, rhs] = expect_operands::<2>(cmp.symbol(), args)?;
        self.gen_expr(lhs)?;
        self.gen_expr(rhs)?;
        self.emit_with(OpCode::Compare, cmp as u8);
        Ok(())
    }

    fn gen_if(&mut self, args: &[Ast]) -> Result<(), CompileError> {
        let (test, consequent, alternate) = match args {
            [test, consequent] => (test, consequent, None),
            [test, consequent, alternate] => (test, consequent, Some(alternate)),
            _ => {
                return Err(CompileError::malformed(
                    "if",
                    format!("expected 2 or 3 operands, found {}", args.len()),
                ))
            }
        };

        self.gen_expr(test)?;
        let else_jump = self.emit_jump(OpCode::JmpIfFalse);

        self.gen_expr(consequent)?;
        let end_jump = self.emit_jump(OpCode::Jmp);

        // the else branch starts without the consequent's value
        self.height = self.height.saturating_sub(1);
        self.patch_here(else_jump)?;
        match alternate {
            Some(alternate) => self.gen_expr(alternate)?,
            None => self.gen_nothing()?,
        }

        self.patch_here(end_jump)
    }

    fn gen_while(&mut self, args: &[Ast]) -> Result<(), CompileError> {
        let [test, body] = expect_operands::<2>("while", args)?;
        self.gen_loop(test, None, body)
    }

    fn gen_for(&mut self, args: &[Ast], position: Position) -> Result<(), CompileError> {
        let [init, test, update, body] = expect_operands::<4>("for", args)?;

        // a local loop variable stays in its slot until the enclosing block ends
        let keeps_init = init.is_declaration() && !self.is_global_scope();
        self.gen_node(init, position)?;
        if !keeps_init {
            self.emit(OpCode::Pop);
        }

        self.gen_loop(test, Some(update), body)
    }

    fn gen_loop(&mut self, test: &Ast, update: Option<&Ast>, body: &Ast) -> Result<(), CompileError> {
        let loop_start = jump_target(self.unit.offset())?;
        self.gen_expr(test)?;
        let exit = self.emit_jump(OpCode::JmpIfFalse);

        self.gen_expr(body)?;
        self.emit(OpCode::Pop);
        if let Some(update) = update {
            self.gen_expr(update)?;
            self.emit(OpCode::Pop);
        }
        self.emit_jump_to(OpCode::Jmp, loop_start);

        self.patch_here(exit)?;
        self.gen_nothing()
    }

    fn gen_var(&mut self, args: &[Ast], position: Position) -> Result<(), CompileError> {
        let [name, init] = expect_operands::<2>("var", args)?;
        let name = variable_name("var", name)?;

        if self.is_global_scope() {
            self.gen_expr(init)?;
            let index = self.globals.define(name);
            return self.gen_global(OpCode::SetGlobal, index);
        }

        // a local lives where its initializer leaves the value, so that value
        // must stay on the stack until the block ends
        if position != Position::Statement {
            return Err(CompileError::malformed(
                "var",
                "a local declaration must be a statement of its block",
            ));
        }

        // the initializer cannot see the variable it initializes
        self.gen_expr(init)?;
        let slot = self.height.saturating_sub(1);
        self.unit.add_local(name, slot);
        self.gen_local(OpCode::SetLocal, slot)
    }

    fn gen_set(&mut self, args: &[Ast]) -> Result<(), CompileError> {
        let [name, value] = expect_operands::<2>("set", args)?;
        let name = variable_name("set", name)?;

        self.gen_expr(value)?;
        match self.resolve(name)? {
            Binding::Local(slot) => self.gen_local(OpCode::SetLocal, slot),
            Binding::Global(index) => self.gen_global(OpCode::SetGlobal, index),
        }
    }

    fn gen_block(&mut self, body: &[Ast]) -> Result<(), CompileError> {
        self.unit.enter_scope();

        if body.is_empty() {
            self.gen_nothing()?;
        }

        for (i, exp) in body.iter().enumerate() {
            let is_last = i + 1 == body.len();
            let is_local_decl = exp.is_declaration() && !self.is_global_scope();

            self.gen_node(exp, Position::Statement)?;

            if is_last && is_local_decl {
                // the block's value must sit above the locals SCOPE_EXIT drops
                let slot = self.height.saturating_sub(1);
                self.gen_local(OpCode::GetLocal, slot)?;
            } else if !is_last && !is_local_decl {
                self.emit(OpCode::Pop);
            }
        }

        let count = self.unit.exit_scope();
        if count > 0 {
            let count = u8::try_from(count).map_err(|_| CompileError::TooManyLocals)?;
            self.emit_with(OpCode::ScopeExit, count);
        }
        Ok(())
    }
}
