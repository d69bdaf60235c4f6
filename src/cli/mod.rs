//! Command-line interface for gen-scenic.
//!
//! Provides commands for generating Scenic programs and checking prompt
//! catalogs.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
