//! docshim CLI - document conversion through supervised sidecars

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use docshim::util::config::{global_config_path, load_config, project_config_path};
use docshim::Config;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("docshim=debug")
    } else {
        EnvFilter::new("docshim=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::Convert(args) => commands::convert::execute(args, &config(cli.config.as_deref())?),
        Commands::Supports(args) => commands::supports::execute(args, &config(cli.config.as_deref())?),
        Commands::Backends(args) => commands::backends::execute(args, &config(cli.config.as_deref())?),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

fn config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::load(path);
    }

    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let project = project_config_path(&cwd);
    match global_config_path() {
        Some(global) => Ok(load_config(&global, &project)),
        None => Ok(Config::load_or_default(&project)),
    }
}
