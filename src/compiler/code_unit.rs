use crate::value::Value;

use super::bytecode::OpCode;

/// A local variable the compiler knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    pub name: Box<str>,
    /// block depth the variable was declared at
    pub depth: usize,
    /// stack slot holding the value
    pub slot: usize,
}

/// Where a 2-byte jump address still has to be written.
///
/// Handed out by [`CodeUnit::emit_jump`] and consumed by [`CodeUnit::patch`],
/// so a placeholder can only be patched once.
#[must_use = "jump placeholders must be patched"]
#[derive(Debug)]
pub struct PatchSite {
    operand: usize,
}

/// A compiled program: bytecode plus the constants it refers to.
///
/// The locals table and scope depth are compile-time bookkeeping; once the
/// compiler hands a unit over they are back at their starting state.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeUnit {
    name: Box<str>,
    code: Vec<u8>,
    constants: Vec<Value>,
    scope_depth: usize,
    locals: Vec<LocalVar>,
}

impl CodeUnit {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Box::from(name.as_ref()),
            code: vec![],
            constants: vec![],
            scope_depth: 0,
            locals: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn constant(&self, index: usize) -> Option<&Value> {
        self.constants.get(index)
    }

    pub fn locals(&self) -> &[LocalVar] {
        &self.locals
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_depth
    }

    /// Offset the next emitted byte will land at
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn emit(&mut self, byte: u8) {
        self.code.push(byte);
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        self.emit(op as u8);
    }

    /// Index of `value` in the constant pool, adding it if absent
    pub(crate) fn constant_index(&mut self, value: Value) -> usize {
        if let Some(index) = self.constants.iter().position(|c| c.same_constant(&value)) {
            return index;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Emits `op` followed by a placeholder address
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> PatchSite {
        self.emit_op(op);
        let operand = self.offset();
        self.emit(0xFF);
        self.emit(0xFF);
        PatchSite { operand }
    }

    /// Emits `op` jumping to an address that is already known
    pub(crate) fn emit_jump_to(&mut self, op: OpCode, target: u16) {
        self.emit_op(op);
        self.code.extend_from_slice(&target.to_be_bytes());
    }

    pub(crate) fn patch(&mut self, site: PatchSite, target: u16) {
        let [hi, lo] = target.to_be_bytes();
        self.code[site.operand] = hi;
        self.code[site.operand + 1] = lo;
    }

    pub(crate) fn enter_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Leaves the current block, forgetting its locals.
    ///
    /// Returns how many locals were declared in it.
    pub(crate) fn exit_scope(&mut self) -> usize {
        let depth = self.scope_depth;
        let kept = self
            .locals
            .iter()
            .rposition(|local| local.depth < depth)
            .map_or(0, |i| i + 1);
        let count = self.locals.len() - kept;
        self.locals.truncate(kept);
        self.scope_depth = depth.saturating_sub(1);
        count
    }

    /// Declares a local in the current block, living in stack `slot`
    pub(crate) fn add_local(&mut self, name: impl AsRef<str>, slot: usize) {
        self.locals.push(LocalVar {
            name: Box::from(name.as_ref()),
            depth: self.scope_depth,
            slot,
        });
    }

    /// Slot of the innermost local called `name`
    pub fn local_index(&self, name: &str) -> Option<usize> {
        self.locals
            .iter()
            .rev()
            .find(|local| &*local.name == name)
            .map(|local| local.slot)
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::CodeUnit;
    use crate::{compiler::bytecode::OpCode, value::Value};

    #[test]
    fn constants_are_deduplicated() {
        let mut unit = CodeUnit::new("main");

        check!(unit.constant_index(Value::number(3.0)) == 0);
        check!(unit.constant_index(Value::string("3")) == 1);
        check!(unit.constant_index(Value::number(3.0)) == 0);
        check!(unit.constant_index(Value::string("3")) == 1);
        check!(unit.constant_index(Value::boolean(false)) == 2);
        check!(unit.constants().len() == 3);
    }

    #[test]
    fn jumps_are_patched_big_endian() {
        let mut unit = CodeUnit::new("main");
        unit.emit_op(OpCode::Pop);
        let site = unit.emit_jump(OpCode::JmpIfFalse);
        check!(unit.code() == [0x0C, 0x08, 0xFF, 0xFF]);

        unit.patch(site, 0x0102);
        check!(unit.code() == [0x0C, 0x08, 0x01, 0x02]);

        unit.emit_jump_to(OpCode::Jmp, 1);
        check!(unit.code()[4..] == [0x09, 0x00, 0x01]);
    }

    #[test]
    fn scopes_forget_their_locals() {
        let mut unit = CodeUnit::new("main");
        unit.enter_scope();
        unit.enter_scope();
        unit.add_local("x", 0);

        unit.enter_scope();
        // slot 1 holds a temporary
        unit.add_local("y", 2);
        unit.add_local("x", 3);
        // shadowing resolves to the innermost declaration
        check!(unit.local_index("x") == Some(3));
        check!(unit.local_index("y") == Some(2));
        check!(unit.exit_scope() == 2);

        check!(unit.local_index("x") == Some(0));
        check!(unit.local_index("y").is_none());
        check!(unit.exit_scope() == 1);
        check!(unit.exit_scope() == 0);
        check!(unit.scope_depth() == 0);
        check!(unit.locals().is_empty());
    }
}
