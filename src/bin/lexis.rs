//! lexis CLI binary.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lexis::cli::{LexisArgs, execute_command};

fn main() {
    let args = LexisArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
