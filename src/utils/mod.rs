//! Shared helpers: subprocess execution and message formatting.

pub mod exec;
pub mod plural;

pub use plural::plural_count;
