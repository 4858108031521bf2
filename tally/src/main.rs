mod color;
mod config;
mod geometry;
mod input;
mod outputs;
mod overlay;
mod render;
mod sandbox;
mod style;
mod wayland;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "tally")]
#[command(version, about = "Overlay bar for Wayland, fed one value per line on standard input")]
struct Cli {
    /// Config file to use instead of the default locations
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output, repeatable
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let path = explicit.or_else(config::default_path);
    let config = match path {
        Some(path) => {
            info!("Using configuration file at {}", path.display());
            config::load(&path)?
        }
        None => {
            info!("No configuration file found, using defaults");
            Config::default()
        }
    };
    config.log_debug();
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    info!("tally {} (pid {})", env!("CARGO_PKG_VERSION"), std::process::id());

    let result = load_config(cli.config).and_then(wayland::run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
