//! Fuel for the machine

/// An instruction budget.
///
/// The virtual machine burns one unit of fuel per dispatched instruction and stops
/// with [`RuntimeError::OutOfFuel`](crate::RuntimeError::OutOfFuel) once the tank is empty.
#[derive(Debug, Clone)]
pub struct Fuel {
    fuel: i32,
}

impl Fuel {
    pub fn with(fuel: i32) -> Self {
        Self { fuel }
    }

    /// Subtract from the current remaining fuel.
    pub fn consume(&mut self, fuel: i32) {
        self.fuel = self.fuel.saturating_sub(fuel);
    }

    /// Returns true if we have positive fuel remaining.
    pub fn should_continue(&self) -> bool {
        self.fuel > 0
    }
}
