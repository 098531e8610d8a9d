//! Silo CLI library
//!
//! Command-line interface for running audited ETL pipelines:
//!
//! - **Pipeline runs**: fetch, stage, load, audit (`silo run`)
//! - **Connectivity probes**: warehouse or source (`silo test-connection`)
//!
//! Each invocation prints one JSON object on stdout and human-readable
//! status on stderr. Exit codes: 0 success, 1 failure, 2 invalid usage.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Silo - staged, audited warehouse ingestion
#[derive(Parser, Debug)]
#[command(name = "silo")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an ETL pipeline
    Run {
        /// Path to the connector JSON/YAML config
        #[arg(long)]
        config: PathBuf,

        /// Query or resource to fetch
        #[arg(long)]
        query: String,

        /// Logical name of the source
        #[arg(long)]
        source: String,

        /// Target warehouse table name
        #[arg(long)]
        table: String,

        /// Base path for the data lake (Parquet)
        #[arg(long)]
        lake: PathBuf,

        /// Target warehouse schema
        #[arg(long, default_value = "public")]
        schema: String,

        /// Pipeline name for auditing
        #[arg(long, default_value = "default")]
        pipeline: String,

        /// Optional warehouse config file layered under DW_* env vars
        #[arg(long)]
        dw_config: Option<PathBuf>,
    },

    /// Test a connection
    TestConnection {
        /// Test the data warehouse connection
        #[arg(long, value_parser = ["dw"])]
        source: Option<String>,

        /// Test a source connection using a config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Optional warehouse config file layered under DW_* env vars
        #[arg(long)]
        dw_config: Option<PathBuf>,
    },
}
