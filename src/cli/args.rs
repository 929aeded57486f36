//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::catalog::MissingLayerPolicy;
use crate::compose::Method;

/// Turn per-layer Figma exports into a positioned PSD composite
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Print per-layer details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: figmapsd.toml, if present)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scan a layer directory and write (or update) the layer document
    #[command(visible_alias = "c")]
    Catalog {
        #[command(flatten)]
        args: CatalogArgs,
    },

    /// Composite the layer document into a PSD
    #[command(visible_alias = "a")]
    Assemble {
        #[command(flatten)]
        args: AssembleArgs,
    },
}

/// Catalog command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct CatalogArgs {
    /// Directory holding the exported layer images
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub layers_dir: Option<PathBuf>,

    /// Layer document to write
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Merge into the existing document, keeping hand edits
    #[arg(short, long)]
    pub update: bool,

    /// Canvas width, overriding the existing and inferred value
    #[arg(long)]
    pub canvas_width: Option<u32>,

    /// Canvas height, overriding the existing and inferred value
    #[arg(long)]
    pub canvas_height: Option<u32>,

    /// What `--update` does with layers whose file is gone
    #[arg(long, value_enum)]
    pub missing: Option<MissingLayerPolicy>,
}

/// Assemble command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct AssembleArgs {
    /// Directory holding the exported layer images
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub layers_dir: Option<PathBuf>,

    /// Layer document to read
    #[arg(short = 'i', long, value_hint = clap::ValueHint::FilePath)]
    pub layers_info: Option<PathBuf>,

    /// File to produce
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Layered keeps one PSD layer per image (needs ImageMagick)
    #[arg(short, long, value_enum)]
    pub method: Option<Method>,

    /// Seconds before an ImageMagick run is killed
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Never call ImageMagick
    #[arg(long)]
    pub no_external_tool: bool,

    /// Skip the in-process PSD writer
    #[arg(long)]
    pub no_builtin_psd: bool,
}
