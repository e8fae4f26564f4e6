//! The VM's value stack.
//!
//! Capacity is fixed when the stack is made and going past it is a fault.
//! Memory is only taken as values are pushed.

use crate::value::Value;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFault {
    #[error("stack overflow (capacity {capacity})")]
    Overflow { capacity: usize },
    #[error("stack underflow")]
    Underflow,
    #[error("no local in slot {0}")]
    InvalidSlot(usize),
}

#[derive(Debug)]
pub struct Stack {
    values: Vec<Value>,
    capacity: usize,
}

impl Stack {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn push(&mut self, value: Value) -> Result<(), StackFault> {
        if self.values.len() >= self.capacity {
            return Err(StackFault::Overflow {
                capacity: self.capacity,
            });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, StackFault> {
        self.values.pop().ok_or(StackFault::Underflow)
    }

    pub fn peek(&self) -> Result<&Value, StackFault> {
        self.values.last().ok_or(StackFault::Underflow)
    }

    /// Locals live at the bottom of the stack, in declaration order
    pub fn local(&self, slot: usize) -> Result<&Value, StackFault> {
        self.values
            .get(slot)
            .ok_or(StackFault::InvalidSlot(slot))
    }

    pub fn set_local(&mut self, slot: usize, value: Value) -> Result<(), StackFault> {
        let local = self
            .values
            .get_mut(slot)
            .ok_or(StackFault::InvalidSlot(slot))?;
        *local = value;
        Ok(())
    }

    /// Removes the `count` values directly beneath the top, keeping the top
    pub fn drop_below_top(&mut self, count: usize) -> Result<(), StackFault> {
        if count >= self.len() {
            return Err(StackFault::Underflow);
        }
        let top = self.values.len() - 1;
        self.values.drain(top - count..top);
        Ok(())
    }

    /// Bottom first
    #[cfg(test)]
    fn values(&self) -> &[Value] {
        &self.values
    }
}
