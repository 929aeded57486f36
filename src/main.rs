//! figmapsd - assemble per-layer Figma exports into a positioned PSD.

mod catalog;
mod cli;
mod compose;
mod config;
mod document;
mod export;
mod logger;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::ToolConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = ToolConfig::load(&cli)?;
    if let Some(source) = &config.source {
        debug!("config"; "loaded {}", source.display());
    }

    match &cli.command {
        Commands::Catalog { args } => cli::catalog::run_catalog(&config.catalog_settings(args)?),
        Commands::Assemble { args } => {
            cli::assemble::run_assemble(&config.assemble_settings(args)?).map(|_| ())
        }
    }
}
