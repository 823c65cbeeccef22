//! Command-line interface definitions.

pub mod cli;

pub use cli::Cli;
