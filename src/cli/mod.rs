//! CLI module for the billing deployment tool.
//!
//! This module provides the command-line interface for deploying,
//! importing and inspecting billing catalogs.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, StrategyArg};
pub use output::OutputFormatter;
