//! Command-line interface for codelm-forge.
//!
//! Provides commands for sequence encoding, generation filtering, signature
//! extraction, and docstring augmentation.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
