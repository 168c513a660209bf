#![forbid(unsafe_code)]
use clap::Parser;
use colored::*;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zerocoin::cli::{describe_error, run, Cli};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}", describe_error(&cli.command, &e).red());
            ExitCode::FAILURE
        }
    }
}
