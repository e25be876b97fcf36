mod cli;
mod commands;
mod kube;
mod prompt;
mod table_theme;

use clap::Parser;
use cli::Cli;
use commands::handle_command;
use std::process::ExitCode;
use vauto_core::crypto::init_crypto;
use vauto_core::instrumentation::init_instrumentation;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_instrumentation(cli.verbose);
    init_crypto();

    let invocation = match cli.invocation() {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match handle_command(&cli, &invocation).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
