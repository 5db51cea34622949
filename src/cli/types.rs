//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "testlens")]
#[command(about = "Testlens - test result reconciliation and insights", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .testlens/
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded event stream (one JSON event per line)
    Replay {
        /// Path to the JSONL event file
        events: PathBuf,

        /// Write the resulting run history as JSON to this path
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Report flaky tests found in an exported run history
    Flaky {
        /// Path to an exported history JSON file
        history: PathBuf,
    },

    /// Summarize a coverage update and report gaps
    Coverage {
        /// Path to a coverage update JSON file
        update: PathBuf,
    },
}
