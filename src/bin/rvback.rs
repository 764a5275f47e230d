//! Command-line driver: reads a front-end IR dump and writes the assembly listing.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use bumpalo::Bump;
use clap::Parser;
use rvback::compiler::{compile_program, CompilerOptions};
use rvback::core::CompilationSession;
use rvback::ir::parse_program;

#[derive(Debug, Parser)]
#[command(name = "rvback", version, about = "Compile an IR dump to assembly")]
struct Args {
    /// IR dump to compile; stdin when absent.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Listing destination; stdout when absent.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rounds of the machine optimizer loop.
    #[arg(long, default_value_t = 10)]
    opt_rounds: usize,

    #[arg(long)]
    no_vectorize: bool,

    #[arg(long)]
    no_schedule: bool,

    /// Also rewrite array get/put operands to constant registers.
    #[arg(long)]
    propagate_array_operands: bool,

    /// Leave the runtime bodies out of the listing.
    #[arg(long)]
    no_runtime: bool,
}

impl Args {
    fn options(&self) -> CompilerOptions {
        CompilerOptions {
            opt_rounds: self.opt_rounds,
            vectorize: !self.no_vectorize,
            schedule_loads: !self.no_schedule,
            propagate_array_operands: self.propagate_array_operands,
            emit_runtime: !self.no_runtime,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let dump = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let program = parse_program(&dump)?;
    let listing = match compile_program(&program, &args.options(), &session) {
        Ok(listing) => listing,
        Err(e) => {
            let function = session.current_function().unwrap_or_default();
            eprintln!("Error in {function}: {e}");
            std::process::exit(1);
        }
    };

    match &args.output {
        Some(path) => fs::write(path, listing)?,
        None => io::stdout().write_all(listing.as_bytes())?,
    }
    Ok(())
}
