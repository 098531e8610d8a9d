//! Silo CLI - Main entry point

use clap::Parser;
use silo_cli::{Cli, Commands};
use silo_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;

#[tokio::main]
async fn main() {
    // Load .env if present; environment always wins
    dotenvy::dotenv().ok();

    // Invalid usage exits with code 2 via clap
    let cli = Cli::parse();

    // Verbose mode logs debug to the console; normal mode only warnings.
    // Console logs go to stderr so the stdout JSON contract stays clean.
    let log_config = if cli.verbose {
        LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::Console)
            .log_file_prefix("silo")
            .build()
    } else {
        LogConfig::builder()
            .level(LogLevel::Warn)
            .output(LogOutput::Console)
            .log_file_prefix("silo")
            .build()
    };

    // Environment variables take precedence over the flag-derived defaults
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    // The CLI works without logging; ignore init failures
    let _ = init_logging(&log_config);

    let exit_code = match cli.command {
        Commands::Run {
            ref config,
            ref query,
            ref source,
            ref table,
            ref lake,
            ref schema,
            ref pipeline,
            ref dw_config,
        } => {
            silo_cli::commands::run::run(
                config,
                query,
                source,
                table,
                lake,
                schema,
                pipeline,
                dw_config.as_deref(),
            )
            .await
        }

        Commands::TestConnection {
            ref source,
            ref config,
            ref dw_config,
        } => {
            silo_cli::commands::test_connection::run(
                source.as_deref(),
                config.as_deref(),
                dw_config.as_deref(),
            )
            .await
        }
    };

    process::exit(exit_code);
}
