use crate::world::Globals;

use super::code_unit::CodeUnit;

/// Where a name lives at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// absolute stack slot
    Local(usize),
    /// index into the global table
    Global(usize),
}

/// Environments define the context names are resolved in while compiling:
/// the locals of the unit being built, backed by the global table.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    unit: &'a CodeUnit,
    globals: &'a Globals,
}

impl<'a> Environment<'a> {
    pub fn new(unit: &'a CodeUnit, globals: &'a Globals) -> Self {
        Self { unit, globals }
    }

    /// Locals shadow globals, and inner locals shadow outer ones
    pub fn get(&self, name: &str) -> Option<Binding> {
        if let Some(slot) = self.unit.local_index(name) {
            Some(Binding::Local(slot))
        } else {
            self.globals.index_of(name).map(Binding::Global)
        }
    }
}
