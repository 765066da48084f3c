//! `kiln`: render component modules into platform manifests.
//!
//! `main` loads `.env`, parses arguments, loads [`AppConfig`], installs the
//! tracing subscriber and dispatches.  Every failure ends up as a
//! [`CliError`] whose exit class picks the exit code:
//!
//! | Code | Meaning                          |
//! |------|----------------------------------|
//! |  0   | Success                          |
//! |  1   | Internal / I/O error             |
//! |  2   | Bad input, module or provider    |
//! |  3   | Missing file or uncovered element|
//! |  4   | Configuration error              |

use std::io::IsTerminal as _;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info, instrument};

use crate::{
    cli::{Cli, Commands},
    config::AppConfig,
    error::{CliError, CliResult},
    logging::init_logging,
    output::OutputManager,
};

mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod output;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version arrive here too; clap picks the exit code.
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { 2 } else { 0 });
        }
    };

    // Logging is configured from the file, so config errors skip tracing.
    let config = match AppConfig::load(cli.global.config.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => return report(&e, !cli.global.no_color, cli.global.verbose > 0),
    };

    if let Err(e) = init_logging(&cli.global, &config.log) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::from(1);
    }

    debug!(
        verbose = cli.global.verbose,
        quiet = cli.global.quiet,
        config = ?cli.global.config,
        "Starting kiln"
    );

    let output = OutputManager::new(&cli.global, &config);
    let color = output.supports_color();
    let verbose = output.is_verbose();

    match run(cli, config, output).await {
        Ok(()) => {
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            e.log();
            report(&e, color, verbose)
        }
    }
}

/// Dispatch to the correct command handler.
#[instrument(skip_all)]
async fn run(cli: Cli, config: AppConfig, output: OutputManager) -> CliResult<()> {
    match cli.command {
        Commands::Render(cmd) => commands::render::execute(cmd, config, output).await,
        Commands::Flatten(cmd) => commands::flatten::execute(cmd, output),
        Commands::Provider(cmd) => commands::provider::execute(cmd, config, output),
        Commands::Config(cmd) => commands::config::execute(cmd, config, output),
    }
}

/// Print `err` to stderr and map it to an exit code.
fn report(err: &CliError, color: bool, verbose: bool) -> ExitCode {
    eprint!("{}", err.format(verbose, color && std::io::stderr().is_terminal()));

    ExitCode::from(err.exit_code())
}

// ── tests ─────────────────────────────────────────────────────────────────────
