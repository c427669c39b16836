//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::resolver::ImmutableStrategy;

/// Billing - Declarative product and price catalog deployment.
#[derive(Parser, Debug)]
#[command(name = "billing")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "BILLING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy the configured catalog to the provider.
    Deploy {
        /// Show what would change without touching the provider or store.
        #[arg(long)]
        dry_run: bool,

        /// Answer immutable price changes without prompting.
        #[arg(long)]
        strategy: Option<StrategyArg>,
    },

    /// Import the provider catalog.
    Import {
        /// Write the local store only.
        #[arg(long, conflicts_with = "generate_config")]
        db_only: bool,

        /// Write a catalog file to this path only.
        #[arg(long, value_name = "PATH")]
        generate_config: Option<PathBuf>,

        /// Only print the summary.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Validate the catalog configuration.
    Validate,

    /// Show the local catalog.
    Status,
}

/// Non-interactive answer to immutable price changes.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StrategyArg {
    /// Archive the old price and create a replacement.
    Archive,
    /// Keep the old price and create one under a new key.
    Duplicate,
    /// Abort the deployment.
    Cancel,
}

impl From<StrategyArg> for ImmutableStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Archive => Self::Archive,
            StrategyArg::Duplicate => Self::Duplicate,
            StrategyArg::Cancel => Self::Cancel,
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}
