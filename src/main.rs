mod api;
mod cli;
mod config;
mod error;
mod model;
mod orchestrator;
mod package;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zs_deploy={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
