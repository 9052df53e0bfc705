use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use jssa::{Engine, EngineOptions};

#[derive(Parser)]
#[command(name = "jssa", version, about = "Abstract ES5.1 interpreter for static analysis")]
struct Cli {
    /// JavaScript file to analyse
    file: Option<PathBuf>,

    /// Analyse inline JavaScript
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Forbid Unknown values; any ambiguity aborts the analysis
    #[arg(long)]
    exact: bool,

    /// Do not execute function bodies; calls yield Unknown
    #[arg(long)]
    no_invoke: bool,

    /// Throw recoverable native exceptions instead of reporting them
    #[arg(long)]
    no_recovery: bool,

    /// Call-recursion depth bound
    #[arg(long, default_value_t = 500)]
    max_recursion: u32,

    /// Loop iteration bound before a loop is declared ambiguous
    #[arg(long, default_value_t = 200_000)]
    max_cycles: u32,

    /// Files excluded from skipped-mode processing (repeatable)
    #[arg(long = "skip-blacklist")]
    skip_blacklist: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = EngineOptions {
        exact_mode: cli.exact,
        invoke_methods: !cli.no_invoke,
        native_exception_recovery: !cli.no_recovery,
        max_recursion_limit: cli.max_recursion,
        max_cycles: cli.max_cycles,
        skipped_mode_blacklist: cli.skip_blacklist,
    };

    let (source, filename) = if let Some(code) = &cli.eval {
        (code.clone(), "<eval>".to_string())
    } else if let Some(path) = &cli.file {
        match std::fs::read_to_string(path) {
            Ok(s) => (s, path.display().to_string()),
            Err(e) => {
                eprintln!("Error reading {}: {e}", path.display());
                return ExitCode::from(1);
            }
        }
    } else {
        eprintln!("Usage: jssa <file> or jssa -e <code>");
        return ExitCode::from(2);
    };

    let mut engine = Engine::with_options(options);
    engine.process_source(&source, Some(&filename));

    let report = engine.report();
    for file in &report.entered_files {
        println!("entered: {file}");
    }
    for warning in &report.warnings {
        eprintln!("warning[{}]: {}", warning.kind, warning.message);
        for frame in &warning.stack_trace {
            eprintln!("    at {frame}");
        }
    }
    for error in &report.errors {
        eprintln!("error[{}]: {}", error.kind, error.message);
        for frame in &error.stack_trace {
            eprintln!("    at {frame}");
        }
    }
    eprintln!(
        "{} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );

    if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
