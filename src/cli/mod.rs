//! Command-line interface for trainset-forge.
//!
//! Provides commands for synthetic data generation, profiling, drift
//! comparison, validation and running a preparation pipeline over
//! JSON-lines files.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
