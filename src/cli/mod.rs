//! Command-line interface module.

mod args;
pub mod assemble;
pub mod catalog;

pub use args::{AssembleArgs, CatalogArgs, Cli, Commands};
