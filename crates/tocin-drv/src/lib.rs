//! tocin-drv - Compiler driver.
//!
//! Owns the command line, the module search path, and pipeline
//! orchestration: read sources, lex, parse, resolve imports, analyze,
//! lower to LLVM IR, and render diagnostics as
//! `file:line:col: severity: CODE: message` sorted by phase then
//! position. Each compilation unit gets its own diagnostic sink and
//! LLVM context; nothing mutable is shared across units.

mod pipeline;
mod repl;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use pipeline::Session;

/// Compilation target. The WebAssembly back-end is an external shell;
/// selecting it only changes the default output extension and reports
/// that the shell is absent from this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Native,
    Wasm,
}

/// Tocin - ahead-of-time compiler for the Tocin language
#[derive(Parser, Debug)]
#[command(name = "tocin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ahead-of-time compiler for the Tocin language", long_about = None)]
pub struct Cli {
    /// Input source file (.to)
    pub input: Option<PathBuf>,

    /// Output file (default: input with .ll, or .wat for wasm)
    #[arg(short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Optimization level (-O0 .. -O3)
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 2)]
    pub opt_level: u8,

    /// Compilation target
    #[arg(long, value_enum, default_value_t = Target::Native)]
    pub target: Target,

    /// Print the parsed AST and stop before analysis output
    #[arg(long)]
    pub dump_ast: bool,

    /// Print the emitted LLVM IR to stdout
    #[arg(long)]
    pub dump_ir: bool,

    /// Print a per-phase timing summary
    #[arg(long)]
    pub time: bool,

    /// Start the interactive REPL
    #[arg(short = 'r')]
    pub repl: bool,

    /// Disable FFI bridges
    #[arg(long)]
    pub no_ffi: bool,

    /// Disable channels, go, and select
    #[arg(long)]
    pub no_concurrency: bool,

    /// Disable advanced language features
    #[arg(long)]
    pub no_advanced: bool,

    /// Disable macro expansion pre-pass
    #[arg(long)]
    pub no_macros: bool,

    /// Disable async/await
    #[arg(long)]
    pub no_async: bool,

    /// Verbose compiler debugging output
    #[arg(long)]
    pub debug: bool,
}

/// Run the driver; returns the process exit code.
///
/// Exit codes: 0 success (warnings allowed), 1 usage error or
/// compilation failure, 2 internal compiler error.
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    init_tracing(cli.debug);

    if cli.repl {
        return repl::run(&cli);
    }

    let Some(input) = cli.input.clone() else {
        eprintln!("error: no input file (or pass -r for the REPL)");
        return Ok(1);
    };

    let mut session = Session::new(&cli);
    Ok(session.compile(&input))
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    // Ignore the error when a subscriber is already installed (tests).
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
