//! The world holds everything a program can reference by name without declaring it:
//! the global table, seeded with built-in constants and grown by global `var`s.

use lasso::{Rodeo, Spur};

use crate::value::Value;

pub mod fuel;
pub mod value;

/// Built-in constants registered before any program runs
pub const BUILTINS: [(&str, f64); 3] = [
    ("PI", std::f64::consts::PI),
    ("THE_ANSWER", 42.0),
    ("VERSION", 0.1),
];

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown global: {0}")]
pub struct UnknownGlobal(pub usize);

#[derive(Debug, Clone)]
struct GlobalVar {
    name: Spur,
    value: Value,
}

/// Ordered, append-only registry of global bindings.
///
/// Once a name is registered its index never changes, which is what lets compiled
/// code address globals by a single byte.
#[derive(Debug, Default)]
pub struct Globals {
    /// interner for global names
    rodeo: Rodeo,
    globals: Vec<GlobalVar>,
}

impl Globals {
    /// An empty table, without the built-ins
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut globals = Self::new();
        for (name, value) in BUILTINS {
            globals.add_const(name, Value::Number(value));
        }
        globals
    }

    /// Registers `name` bound to `Number(0)`.
    ///
    /// If the name already exists this does nothing, and the existing binding keeps
    /// its value. Returns the binding's index either way.
    pub fn define(&mut self, name: impl AsRef<str>) -> usize {
        self.add_const(name, Value::Number(0.0))
    }

    /// Registers `name` bound to `value` unless it already exists
    pub fn add_const(&mut self, name: impl AsRef<str>, value: Value) -> usize {
        if let Some(index) = self.index_of(name.as_ref()) {
            return index;
        }

        let name = self.rodeo.get_or_intern(name.as_ref());
        self.globals.push(GlobalVar { name, value });
        self.globals.len() - 1
    }

    pub fn get(&self, index: usize) -> Result<&Value, UnknownGlobal> {
        self.globals
            .get(index)
            .map(|global| &global.value)
            .ok_or(UnknownGlobal(index))
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<(), UnknownGlobal> {
        let global = self.globals.get_mut(index).ok_or(UnknownGlobal(index))?;
        global.value = value;
        Ok(())
    }

    pub fn name(&self, index: usize) -> Result<&str, UnknownGlobal> {
        self.globals
            .get(index)
            .map(|global| self.rodeo.resolve(&global.name))
            .ok_or(UnknownGlobal(index))
    }

    /// Finds the most recently registered global called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        // a name that was never interned cannot name a global
        let name = self.rodeo.get(name)?;
        self.globals.iter().rposition(|global| global.name == name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Forgets globals registered after the first `len`.
    ///
    /// Only for undoing the definitions of a compilation that failed, before any
    /// code referring to them could run.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.globals.truncate(len);
    }

    /// Every global as `(name, value)`, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.globals
            .iter()
            .map(|global| (self.rodeo.resolve(&global.name), &global.value))
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::{Globals, UnknownGlobal};
    use crate::value::Value;

    #[test]
    fn builtins_are_registered_in_order() {
        let globals = Globals::with_builtins();

        check!(globals.len() == 3);
        check!(globals.name(0) == Ok("PI"));
        check!(globals.get(0) == Ok(&Value::Number(std::f64::consts::PI)));
        check!(globals.index_of("THE_ANSWER") == Some(1));
        check!(globals.get(1) == Ok(&Value::Number(42.0)));
        check!(globals.get(2) == Ok(&Value::Number(0.1)));
    }

    #[test]
    fn define_is_idempotent() {
        let mut globals = Globals::new();

        let x = globals.define("x");
        check!(globals.get(x) == Ok(&Value::Number(0.0)));
        globals.set(x, Value::string("kept")).unwrap();

        // first definition wins
        check!(globals.define("x") == x);
        check!(globals.len() == 1);
        check!(globals.get(x) == Ok(&Value::string("kept")));

        check!(globals.add_const("x", Value::Boolean(true)) == x);
        check!(globals.get(x) == Ok(&Value::string("kept")));
    }

    #[test]
    fn lookup_of_missing_names() {
        let mut globals = Globals::with_builtins();

        check!(globals.index_of("nope").is_none());
        check!(!globals.exists("nope"));
        check!(globals.exists("PI"));

        globals.define("other");
        check!(!globals.exists("othe"));
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut globals = Globals::with_builtins();

        let_assert!(Err(UnknownGlobal(7)) = globals.get(7));
        let_assert!(Err(UnknownGlobal(3)) = globals.set(3, Value::Number(1.0)));
        let_assert!(Err(UnknownGlobal(9)) = globals.name(9));
        check!(UnknownGlobal(9).to_string() == "unknown global: 9");
    }

    #[test]
    fn iteration_keeps_registration_order() {
        let mut globals = Globals::new();
        globals.define("b");
        globals.define("a");

        let names = globals.iter().map(|(name, _)| name).collect::<Vec<_>>();
        check!(names == ["b", "a"]);
    }
}
