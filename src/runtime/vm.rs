use tracing::{debug, trace};

use crate::{
    ast::Ast,
    compiler::{CodeUnit, Comparator, CompileError, Compiler, OpCode},
    disassembler::{disassemble, DisassembleError, Disassembly},
    reader::read_program,
    value::Value,
    world::Globals,
    Error, Fuel,
};

use super::{stack::Stack, RuntimeError, VmConfig};

/// Bounds-checked reads from the bytecode of the unit being run
struct Cursor<'a> {
    code: &'a [u8],
    ip: usize,
}

impl<'a> Cursor<'a> {
    fn new(code: &'a [u8]) -> Self {
        Self { code, ip: 0 }
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let byte = *self
            .code
            .get(self.ip)
            .ok_or(RuntimeError::UnexpectedEnd(self.ip))?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_address(&mut self) -> Result<usize, RuntimeError> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(usize::from(u16::from_be_bytes([hi, lo])))
    }

    fn jump(&mut self, address: usize) {
        self.ip = address;
    }
}

/// Runs code units on a fixed-size value stack.
///
/// The VM owns the global table, so globals declared by one [`Vm::exec`] are
/// visible to the next.
#[derive(Debug)]
pub struct Vm {
    config: VmConfig,
    globals: Globals,
    stack: Stack,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: Stack::new(config.stack_capacity),
            globals: Globals::with_builtins(),
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn compile(&mut self, program: &Ast) -> Result<CodeUnit, CompileError> {
        Compiler::new(&mut self.globals).compile(program)
    }

    pub fn disassemble(&self, unit: &CodeUnit) -> Result<Disassembly, DisassembleError> {
        disassemble(unit, &self.globals)
    }

    /// Reads, compiles and runs `source`
    pub fn exec(&mut self, source: &str) -> Result<Value, Error> {
        let program = read_program(source)?;
        let unit = self.compile(&program)?;

        if self.config.disassemble {
            match self.disassemble(&unit) {
                Ok(listing) => debug!("\n{listing}"),
                Err(err) => debug!(%err, "could not disassemble"),
            }
        }

        Ok(self.run(&unit)?)
    }

    /// Executes `unit` until it halts, returning the value on top of the stack
    pub fn run(&mut self, unit: &CodeUnit) -> Result<Value, RuntimeError> {
        self.stack.reset();
        let mut fuel = self.config.fuel.map(Fuel::with);
        let mut cursor = Cursor::new(unit.code());

        loop {
            if let Some(fuel) = &mut fuel {
                if !fuel.should_continue() {
                    return Err(RuntimeError::OutOfFuel);
                }
                fuel.consume(1);
            }

            let offset = cursor.ip;
            let byte = cursor.read_byte()?;
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode {
                opcode: byte,
                offset,
            })?;
            trace!(offset, %op, depth = self.stack.len(), "dispatch");

            match op {
                OpCode::Halt => return Ok(self.stack.pop()?),
                OpCode::Const => {
                    let index = usize::from(cursor.read_byte()?);
                    let value = unit
                        .constant(index)
                        .cloned()
                        .ok_or(RuntimeError::UnknownConstant(index))?;
                    self.stack.push(value)?;
                }
                OpCode::Add => {
                    let rhs = self.stack.pop()?;
                    let lhs = self.stack.pop()?;
                    let sum = match (&lhs, &rhs) {
                        (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                        _ => match (lhs.as_str(), rhs.as_str()) {
                            (Ok(a), Ok(b)) => Value::string(format!("{a}{b}")),
                            _ => return Err(invalid_operands(op, &lhs, &rhs)),
                        },
                    };
                    self.stack.push(sum)?;
                }
                OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
                    let rhs = self.stack.pop()?;
                    let lhs = self.stack.pop()?;
                    let (Value::Number(a), Value::Number(b)) = (&lhs, &rhs) else {
                        return Err(invalid_operands(op, &lhs, &rhs));
                    };
                    let result = match op {
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        // remainder of the operands truncated to integers
                        _ => {
                            let divisor = *b as i64;
                            if divisor == 0 {
                                return Err(RuntimeError::DivisionByZero);
                            }
                            (*a as i64).wrapping_rem(divisor) as f64
                        }
                    };
                    self.stack.push(Value::Number(result))?;
                }
                OpCode::Compare => {
                    let code = cursor.read_byte()?;
                    let cmp =
                        Comparator::from_u8(code).ok_or(RuntimeError::UnknownComparator(code))?;
                    let rhs = self.stack.pop()?;
                    let lhs = self.stack.pop()?;
                    let result = match (&lhs, &rhs) {
                        (Value::Number(a), Value::Number(b)) => cmp.apply(a, b),
                        _ => match (lhs.as_str(), rhs.as_str()) {
                            (Ok(a), Ok(b)) => cmp.apply(a, b),
                            _ => return Err(invalid_operands(op, &lhs, &rhs)),
                        },
                    };
                    self.stack.push(Value::Boolean(result))?;
                }
                OpCode::JmpIfFalse => {
                    let condition = self.stack.pop()?.as_boolean()?;
                    let address = cursor.read_address()?;
                    if !condition {
                        cursor.jump(address);
                    }
                }
                OpCode::Jmp => {
                    let address = cursor.read_address()?;
                    cursor.jump(address);
                }
                OpCode::GetGlobal => {
                    let index = usize::from(cursor.read_byte()?);
                    let value = self.globals.get(index)?.clone();
                    self.stack.push(value)?;
                }
                OpCode::SetGlobal => {
                    let index = usize::from(cursor.read_byte()?);
                    let value = self.stack.peek()?.clone();
                    self.globals.set(index, value)?;
                }
                OpCode::Pop => {
                    self.stack.pop()?;
                }
                OpCode::GetLocal => {
                    let slot = usize::from(cursor.read_byte()?);
                    let value = self.stack.local(slot)?.clone();
                    self.stack.push(value)?;
                }
                OpCode::SetLocal => {
                    let slot = usize::from(cursor.read_byte()?);
                    let value = self.stack.peek()?.clone();
                    self.stack.set_local(slot, value)?;
                }
                OpCode::ScopeExit => {
                    let count = usize::from(cursor.read_byte()?);
                    self.stack.drop_below_top(count)?;
                }
            }
        }
    }
}

fn invalid_operands(op: OpCode, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::InvalidOperands {
        op,
        left: lhs.kind(),
        right: rhs.kind(),
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::Vm;
    use crate::{
        compiler::{CodeUnit, Comparator, OpCode},
        runtime::{RuntimeError, StackFault, VmConfig},
        value::{TypeMismatch, Value, ValueKind},
        world::UnknownGlobal,
        Ast, Error,
    };

    fn exec(source: &str) -> Result<Value, Error> {
        Vm::new().exec(source)
    }

    fn runtime_error(source: &str) -> RuntimeError {
        let_assert!(Err(Error::Runtime(err)) = exec(source));
        err
    }

    #[test]
    fn arithmetic() {
        check!(exec("(+ 1 2)") == Ok(Value::number(3.0)));
        check!(exec("(- 10 4)") == Ok(Value::number(6.0)));
        check!(exec("(* (+ 1 2) 4)") == Ok(Value::number(12.0)));
        check!(exec("(/ 7 2)") == Ok(Value::number(3.5)));
        check!(exec("(% 7 3)") == Ok(Value::number(1.0)));
        check!(exec("(% -7.9 3.2)") == Ok(Value::number(-1.0)));
        check!(exec("(/ 1 0)") == Ok(Value::number(f64::INFINITY)));
    }

    #[test]
    fn string_concatenation() {
        check!(exec(r#"(+ "Hello " "Jelly")"#) == Ok(Value::string("Hello Jelly")));
        check!(
            exec(r#"(var s "a") (set s (+ s "b")) (+ s s)"#) == Ok(Value::string("abab"))
        );
    }

    #[test]
    fn comparisons() {
        check!(exec("(< 1 2)") == Ok(Value::boolean(true)));
        check!(exec("(>= 1 2)") == Ok(Value::boolean(false)));
        check!(exec("(== 2 2)") == Ok(Value::boolean(true)));
        check!(exec("(!= 2 2)") == Ok(Value::boolean(false)));
        check!(exec(r#"(== "ab" (+ "a" "b"))"#) == Ok(Value::boolean(true)));
        check!(exec(r#"(< "apple" "banana")"#) == Ok(Value::boolean(true)));
    }

    #[test]
    fn conditionals() {
        check!(exec("(if (> 2 1) 1 2)") == Ok(Value::number(1.0)));
        check!(exec("(if (< 2 1) 1 2)") == Ok(Value::number(2.0)));
        check!(exec("(if (< 2 1) 1)") == Ok(Value::boolean(false)));
        check!(exec("(if true (if false 1 2) 3)") == Ok(Value::number(2.0)));
    }

    #[test]
    fn while_loop() {
        let source = "(var i 10)
            (var count 0)
            (while (> i 0)
                (begin (set i (- i 1)) (set count (+ count 1))))
            count";
        check!(exec(source) == Ok(Value::number(10.0)));
        check!(exec("(while false 1)") == Ok(Value::boolean(false)));
    }

    #[test]
    fn for_loop() {
        let source = "(var sum 0)
            (for (var i 0) (< i 5) (set i (+ i 1))
                (set sum (+ sum i)))
            sum";
        check!(exec(source) == Ok(Value::number(10.0)));

        let local = "(begin
            (var total 0)
            (for (var i 1) (<= i 4) (set i (+ i 1))
                (set total (* 2 i)))
            total)";
        check!(exec(local) == Ok(Value::number(8.0)));
    }

    #[test]
    fn block_scoping() {
        check!(exec("(var x 5) (begin (var x 10) x) x") == Ok(Value::number(5.0)));
        check!(exec("(var x 5) (begin (var x 10) x)") == Ok(Value::number(10.0)));
        check!(exec("(begin (var a 1) (begin (var b 2) (+ a b)))") == Ok(Value::number(3.0)));
        check!(exec("(begin (var a 1) (var b 2))") == Ok(Value::number(2.0)));
        check!(exec("(begin (var a 1) (set a (+ a 41)) a)") == Ok(Value::number(42.0)));
        check!(exec("(begin)") == Ok(Value::boolean(false)));
        check!(exec("(* 2 (begin (var y 3) (+ y 1)))") == Ok(Value::number(8.0)));
    }

    #[test]
    fn builtins() {
        check!(exec("PI") == Ok(Value::number(std::f64::consts::PI)));
        check!(exec("(+ THE_ANSWER 0)") == Ok(Value::number(42.0)));
        check!(exec("VERSION") == Ok(Value::number(0.1)));
    }

    #[test]
    fn globals_persist_across_runs() {
        let mut vm = Vm::new();
        check!(vm.exec("(var counter 1)") == Ok(Value::number(1.0)));
        check!(vm.exec("(set counter (+ counter 1))") == Ok(Value::number(2.0)));
        check!(vm.exec("counter") == Ok(Value::number(2.0)));
        // first definition keeps its slot, the initializer still runs
        check!(vm.exec("(var counter 7) counter") == Ok(Value::number(7.0)));
        check!(vm.globals().len() == 4);
    }

    #[test]
    fn operand_errors() {
        check!(
            runtime_error(r#"(+ 1 "a")"#)
                == RuntimeError::InvalidOperands {
                    op: OpCode::Add,
                    left: ValueKind::Number,
                    right: ValueKind::String
                }
        );
        check!(
            runtime_error(r#"(* "a" "b")"#)
                == RuntimeError::InvalidOperands {
                    op: OpCode::Mul,
                    left: ValueKind::String,
                    right: ValueKind::String
                }
        );
        let_assert!(RuntimeError::InvalidOperands { op: OpCode::Compare, .. } = runtime_error("(< true 1)"));
        check!(
            runtime_error("(if 1 2 3)")
                == RuntimeError::TypeMismatch(TypeMismatch {
                    expected: ValueKind::Boolean,
                    found: ValueKind::Number
                })
        );
        check!(runtime_error("(% 5 0)") == RuntimeError::DivisionByZero);
        check!(runtime_error("(% 5 0.5)") == RuntimeError::DivisionByZero);
        check!(runtime_error(r#"(+ true false)"#).to_string() == "cannot ADD BOOLEAN and BOOLEAN");
    }

    #[test]
    fn modulo_truncates_operands() {
        check!(exec("(% 7.9 2)") == Ok(Value::number(1.0)));
        check!(exec("(% -7 2)") == Ok(Value::number(-1.0)));
        // the one quotient that does not fit in an i64
        check!(exec("(% -9223372036854775808 -1)") == Ok(Value::number(0.0)));
    }

    #[test]
    fn read_and_compile_errors_surface_through_exec() {
        let_assert!(Err(Error::Read(_)) = exec("(+ 1 2"));
        let_assert!(Err(Error::Compile(_)) = exec("(+ 1 nope)"));
    }

    #[test]
    fn fuel_stops_runaway_loops() {
        let mut vm = Vm::with_config(VmConfig {
            fuel: Some(1_000),
            ..VmConfig::default()
        });
        let_assert!(Err(Error::Runtime(RuntimeError::OutOfFuel)) = vm.exec("(while true 1)"));
        // fuel is per run
        check!(vm.exec("(+ 1 1)") == Ok(Value::number(2.0)));
    }

    #[test]
    fn stack_overflow() {
        let mut vm = Vm::with_config(VmConfig {
            stack_capacity: 2,
            ..VmConfig::default()
        });
        check!(vm.exec("(+ 1 2)") == Ok(Value::number(3.0)));
        let_assert!(
            Err(Error::Runtime(RuntimeError::StackFault(StackFault::Overflow { capacity: 2 })))
                = vm.exec("(+ 1 (+ 2 3))")
        );
    }

    #[test]
    fn huge_stack_capacity_is_only_a_limit() {
        let mut vm = Vm::with_config(VmConfig {
            stack_capacity: usize::MAX,
            ..VmConfig::default()
        });
        check!(vm.exec("(+ 1 (+ 2 3))") == Ok(Value::number(6.0)));
    }

    fn hand_built(code: &[u8], constants: &[Value]) -> CodeUnit {
        let mut unit = CodeUnit::new("hand");
        for value in constants {
            unit.constant_index(value.clone());
        }
        for byte in code {
            unit.emit(*byte);
        }
        unit
    }

    #[test]
    fn malformed_bytecode_faults() {
        let mut vm = Vm::new();
        let halt = OpCode::Halt as u8;
        let cnst = OpCode::Const as u8;

        check!(
            vm.run(&hand_built(&[halt], &[]))
                == Err(RuntimeError::StackFault(StackFault::Underflow))
        );
        check!(
            vm.run(&hand_built(&[0xEE], &[]))
                == Err(RuntimeError::UnknownOpcode {
                    opcode: 0xEE,
                    offset: 0
                })
        );
        check!(vm.run(&hand_built(&[cnst, 4, halt], &[])) == Err(RuntimeError::UnknownConstant(4)));
        check!(vm.run(&hand_built(&[cnst], &[])) == Err(RuntimeError::UnexpectedEnd(1)));
        // running off the end without HALT
        check!(
            vm.run(&hand_built(&[cnst, 0], &[Value::number(1.0)]))
                == Err(RuntimeError::UnexpectedEnd(2))
        );
        check!(
            vm.run(&hand_built(&[OpCode::GetGlobal as u8, 99, halt], &[]))
                == Err(RuntimeError::UnknownGlobal(UnknownGlobal(99)))
        );
        check!(
            vm.run(&hand_built(&[OpCode::GetLocal as u8, 0, halt], &[]))
                == Err(RuntimeError::StackFault(StackFault::InvalidSlot(0)))
        );
        check!(
            vm.run(&hand_built(
                &[cnst, 0, cnst, 0, OpCode::Compare as u8, 17, halt],
                &[Value::number(1.0)]
            )) == Err(RuntimeError::UnknownComparator(17))
        );
        check!(
            vm.run(&hand_built(&[cnst, 0, OpCode::ScopeExit as u8, 1, halt], &[Value::number(1.0)]))
                == Err(RuntimeError::StackFault(StackFault::Underflow))
        );
        // a jump past the end stops instead of reading out of bounds
        check!(
            vm.run(&hand_built(&[OpCode::Jmp as u8, 0x10, 0x00], &[]))
                == Err(RuntimeError::UnexpectedEnd(0x1000))
        );
    }

    #[test]
    fn a_failed_run_does_not_poison_the_next() {
        let mut vm = Vm::new();
        let_assert!(Err(_) = vm.exec(r#"(+ 1 (+ 2 "x"))"#));
        check!(vm.exec("(+ 2 2)") == Ok(Value::number(4.0)));
    }

    #[test]
    fn compiled_asts_run_directly() {
        let mut vm = Vm::new();
        let program = Ast::program([Ast::list([
            Ast::symbol("*"),
            Ast::symbol("THE_ANSWER"),
            Ast::number(2.0),
        ])]);
        let_assert!(Ok(unit) = vm.compile(&program));
        check!(vm.run(&unit) == Ok(Value::number(84.0)));
        // running a unit twice starts from a clean stack
        check!(vm.run(&unit) == Ok(Value::number(84.0)));
    }

    #[test]
    fn comparison_matches_host_semantics() {
        arbtest::arbtest(|u| {
            let cmp: Comparator = u.arbitrary()?;
            let a = f64::from(u.int_in_range(-5i8..=5)?);
            let b = f64::from(u.int_in_range(-5i8..=5)?);

            let source = format!("({} {a} {b})", cmp.symbol());
            let expected = match cmp {
                Comparator::Less => a < b,
                Comparator::Greater => a > b,
                Comparator::Equal => a == b,
                Comparator::LessEqual => a <= b,
                Comparator::GreaterEqual => a >= b,
                Comparator::NotEqual => a != b,
            };
            check!(exec(&source) == Ok(Value::boolean(expected)));
            Ok(())
        });
    }
}
