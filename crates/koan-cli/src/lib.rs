//! koan-cli - The command-line driver.
//!
//! Resolves options, spins up an interpreter, and either runs the
//! given expressions/files or drops into the interactive loop. Exit
//! code 0 on success, 1 on a driver-level failure; language-level
//! errors print with their source location and do not abort the
//! session.

mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use koan_core::{Interp, Kind, NodeId, Options};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "koan", version, about = "The Koan interpreter", disable_help_subcommand = true)]
struct Cli {
    /// Suppress result output
    #[arg(short, long)]
    quiet: bool,

    /// Enable basic trace output
    #[arg(short = 't', long)]
    trace: bool,

    /// Enable verbose trace output
    #[arg(short, long)]
    verbose: bool,

    /// Output the names of all builtins
    #[arg(long)]
    list_builtins: bool,

    /// Parse, but do not evaluate
    #[arg(short = 'n', long)]
    noeval: bool,

    /// Timed execution
    #[arg(short = 'T', long)]
    timed: bool,

    /// Enable math functions in the global namespace
    #[arg(short, long)]
    math: bool,

    /// Evaluate EXPRESSIONs (up to -)
    #[arg(short = 'x', long = "evaluate", num_args = 1.., value_terminator = "-")]
    evaluate: Vec<String>,

    /// Add a search PATH for import
    #[arg(short = 'I', long = "import-path")]
    import_path: Vec<String>,

    /// Import FILE before anything else runs
    #[arg(short = 'i', long = "import")]
    import: Vec<String>,

    /// Execute FILE, binding argv/argc
    file: Option<String>,

    /// Arguments passed through to the script
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "koan_core=trace,koan_lex=trace,koan_cli=trace"
    } else if cli.trace {
        "koan_core=debug,koan_lex=debug,koan_cli=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Print every named entry of an environment (operator table,
/// globals, system environment).
fn list_env(interp: &Interp, env: NodeId) {
    if let Kind::Environment { map, .. } = interp.kind(env) {
        for &item in interp.heap.map(map).items() {
            if let Some(name) = interp.kind(item).name() {
                println!("{}", interp.str(name));
            }
        }
    }
}

fn report(interp: &mut Interp, result: NodeId, quiet: bool) {
    if !quiet && !result.is_zen() {
        println!("{}", interp.render(result, false));
    }
}

/// Parse without evaluating (the `--noeval` path).
fn parse_only(interp: &mut Interp, text: &str, source: u32, line: &mut u32) {
    let mut at = 0usize;
    while at < text.len() {
        let (_, consumed, new_line) = interp.parse_text(&text[at..], source, *line, false);
        *line = new_line;
        at += consumed;
        if consumed == 0 {
            break;
        }
    }
}

fn run_source(interp: &mut Interp, text: &str, source: u32, quiet: bool, noeval: bool) {
    let mut line = 1u32;
    if noeval {
        parse_only(interp, text, source, &mut line);
    } else {
        interp.process(text, source, &mut line, |interp, result| {
            report(interp, result, quiet);
        });
    }
}

fn run_file(interp: &mut Interp, path: &str, quiet: bool, noeval: bool) -> Result<()> {
    let text = interp
        .map_source_file(path)
        .with_context(|| format!("cannot execute {}", path))?;
    let source = interp.add_source(path);
    run_source(interp, &text, source, quiet, noeval);
    Ok(())
}

fn report_elapsed(elapsed: std::time::Duration) {
    eprintln!("\nexecution time: {:.6} seconds", elapsed.as_secs_f64());
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut interp = Interp::new(Options { math: cli.math });
    for path in &cli.import_path {
        interp.add_search_path(path);
    }

    if cli.list_builtins {
        list_env(&interp, interp.operators);
        list_env(&interp, interp.globals);
        list_env(&interp, interp.system_env);
    }

    let started = std::time::Instant::now();
    let mut ran_something = false;

    for path in &cli.import {
        interp
            .import_file(path)
            .with_context(|| format!("cannot import {}", path))?;
        ran_something = true;
    }

    if !cli.evaluate.is_empty() {
        for expr in &cli.evaluate {
            run_source(&mut interp, expr, 0, cli.quiet, cli.noeval);
        }
        ran_something = true;
    }

    if let Some(path) = &cli.file {
        let mut argv = vec![path.clone()];
        argv.extend(cli.args.iter().cloned());
        let system_env = interp.system_env;
        interp.addenv_argv(system_env, koan_core::Sloc::NONE, &argv);
        run_file(&mut interp, path, cli.quiet, cli.noeval)?;
        ran_something = true;
    }

    if !ran_something && !cli.list_builtins {
        repl::interactive(&mut interp, cli.quiet, cli.noeval)?;
    }

    if cli.timed {
        report_elapsed(started.elapsed());
    }
    Ok(())
}
