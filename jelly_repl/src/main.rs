use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use codesnake::{Block, CodeWidth, Label, LineIndex};
use jelly::{read_program, runtime::STACK_LIMIT, ReadError, Vm, VmConfig};
use tracing_subscriber::EnvFilter;
use yansi::Paint;

/// Run a Jelly program, or start an interactive session without one.
///
/// In a session, `:globals` lists every global and its value.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// source file to run
    script: Option<PathBuf>,
    /// print the bytecode of everything before running it
    #[arg(long)]
    disassemble: bool,
    /// how many values the VM stack can hold
    #[arg(long, default_value_t = STACK_LIMIT)]
    stack_capacity: usize,
    /// instruction budget for each run
    #[arg(long)]
    fuel: Option<i32>,
}

fn report_read_error(name: &str, source: &str, err: &ReadError) {
    let idx = LineIndex::new(source);
    let label = Label::new(err.span.clone())
        .with_text(err.kind.to_string().red().to_string())
        .with_style(|s: String| s.red().to_string());

    match Block::new(&idx, [label]) {
        Some(block) => {
            let block = block.map_code(|c| CodeWidth::new(c, c.len()));
            println!("{}[{name}]", block.prologue());
            print!("{block}");
            println!("{}", block.epilogue());
        }
        None => println!("{}", err.red()),
    }
}

fn print_globals(vm: &Vm) {
    for (name, value) in vm.globals().iter() {
        println!("{} = {}", name.cyan(), value.green());
    }
}

/// Returns whether the program ran to completion
fn run(vm: &mut Vm, name: &str, source: &str, disassemble: bool) -> bool {
    let program = match read_program(source) {
        Ok(program) => program,
        Err(err) => {
            report_read_error(name, source, &err);
            return false;
        }
    };

    let unit = match vm.compile(&program) {
        Ok(unit) => unit,
        Err(err) => {
            println!("{}", format!("compile error: {err}").red());
            return false;
        }
    };

    if disassemble {
        match vm.disassemble(&unit) {
            Ok(listing) => print!("{}", listing.dim()),
            Err(err) => println!("{}", format!("cannot disassemble: {err}").yellow()),
        }
    }

    match vm.run(&unit) {
        Ok(value) => {
            println!("{}", value.green());
            true
        }
        Err(err) => {
            println!("{}", format!("runtime error: {err}").red());
            false
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut vm = Vm::with_config(VmConfig {
        stack_capacity: args.stack_capacity,
        fuel: args.fuel,
        ..VmConfig::default()
    });

    if let Some(path) = &args.script {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let name = path.display().to_string();
        if !run(&mut vm, &name, &source, args.disassemble) {
            anyhow::bail!("{name} did not run to completion");
        }
        return Ok(());
    }

    let mut readline = rustyline::DefaultEditor::new()?;
    while let Ok(input) = readline.readline("jelly> ") {
        if input.trim().is_empty() {
            continue;
        }
        readline.add_history_entry(input.as_str())?;
        if input.trim() == ":globals" {
            print_globals(&vm);
            continue;
        }
        run(&mut vm, "repl", &input, args.disassemble);
    }

    Ok(())
}
