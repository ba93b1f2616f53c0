// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # SiGa Gateway CLI
//!
//! The `siga` binary manages configuration for a SiGa signing gateway node.
//!
//! ## Commands
//!
//! - `siga config show [--paths]` - Print the effective configuration
//! - `siga config validate [FILE]` - Validate a configuration file
//! - `siga config generate [-o FILE]` - Write a sample configuration
//!
//! Logging precedence: `RUST_LOG`, then `--log-level`/`--log-format` (or their
//! environment variables), then the `logging` section of the configuration,
//! then `info` in text format.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use siga_core::domain::gateway_config::{GatewayConfigManifest, LoggingConfig};

mod commands;

use commands::ConfigCommand;

/// SiGa signing gateway
#[derive(Parser)]
#[command(name = "siga")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SIGA_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SIGA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, env = "SIGA_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let configured = GatewayConfigManifest::load_or_default(cli.config.clone())
        .ok()
        .and_then(|config| config.spec.logging);
    let (level, format) = resolve_logging(cli.log_level, cli.log_format, configured.as_ref());
    init_logging(&level, format)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Pick the log level and format from flags first, then configuration.
fn resolve_logging(
    level: Option<String>,
    format: Option<LogFormat>,
    configured: Option<&LoggingConfig>,
) -> (String, LogFormat) {
    let level = level
        .or_else(|| configured.map(|c| c.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = format.unwrap_or_else(|| match configured.map(|c| c.format.as_str()) {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Text,
    });
    (level, format)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
