//! `gad`: the command-line entry point for the Gad scripting language.
//! Runs a script, or drops into an interactive REPL when none is given
//! (spec.md §6).

mod args;
mod diagnostics;
mod disasm;
mod export;
mod pipeline;
mod repl;
mod resolver;
mod runner;

use clap::{CommandFactory, Parser};
use pipeline::TracePhase;
use std::path::PathBuf;

/// Gad: an embeddable, dynamically-typed scripting language.
#[derive(Parser, Debug)]
#[command(name = "gad", version, about)]
struct Cli {
    /// Trace one or more compiler phases to stderr (parser, optimizer, compiler).
    #[arg(long, value_enum, value_delimiter = ',')]
    trace: Vec<TracePhase>,

    /// Skip the AST-level optimizer passes.
    #[arg(long)]
    no_optimizer: bool,

    /// Sandbox imports to the script's own directory; ignore GADPATH.
    #[arg(long)]
    safe: bool,

    /// Run the script as a module: print its top-level globals as JSON
    /// instead of just executing it.
    #[arg(long)]
    module: bool,

    /// Comma-separated builtin module names to disable (e.g. time,fmt).
    #[arg(long, value_delimiter = ',')]
    disabled_modules: Vec<String>,

    /// Abort the script after DURATION (plain seconds, or suffixed with ms/s/m).
    #[arg(long)]
    timeout: Option<String>,

    /// Print a shell completion script for SHELL and exit.
    #[arg(long, value_enum)]
    completions: Option<clap_complete::Shell>,

    /// Script to run; "-" reads from stdin. REPL starts if omitted.
    script: Option<String>,

    /// Arguments passed to the script as Args/NamedArgs.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    script_args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let timeout = match cli.timeout.as_deref().map(runner::parse_timeout) {
        Some(Ok(d)) => Some(d),
        Some(Err(e)) => {
            eprintln!("gad: {e}");
            std::process::exit(1);
        }
        None => None,
    };

    let exit_code = match cli.script {
        Some(script) => {
            tracing::debug!(%script, "running script");
            runner::run(runner::RunOptions {
                script: &script,
                script_args: &cli.script_args,
                trace: &cli.trace,
                no_optimizer: cli.no_optimizer,
                safe: cli.safe,
                module: cli.module,
                disabled_modules: &cli.disabled_modules,
                timeout,
            })
        }
        None => {
            repl::run(cli.safe, cli.disabled_modules, history_path());
            0
        }
    };

    std::process::exit(exit_code);
}

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gad_history"))
}
