// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use siga_core::domain::gateway_config::GatewayConfigManifest;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./siga-config.yaml)
        #[arg(short, long, default_value = "./siga-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    tracing::debug!(config = ?config_override, "Running config command");

    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        for (i, path) in GatewayConfigManifest::candidate_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} ({})", i + 2, path.display(), marker);
        }
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Device signing:".bold());
    println!(
        "  Mobile-ID polling delay: {}",
        humanize(spec.mobile_id.status_polling_delay)
    );
    println!(
        "  Smart-ID polling delay: {}",
        humanize(spec.smart_id.status_polling_delay)
    );
    println!("  Smart-ID certificate level: {}", spec.smart_id.certificate_level);
    println!();

    println!("{}", "Status reprocessing:".bold());
    let reprocessing = &spec.status_reprocessing;
    println!("  Max processing attempts: {}", reprocessing.max_processing_attempts);
    println!("  Processing timeout: {}", humanize(reprocessing.processing_timeout));
    println!("  Exception timeout: {}", humanize(reprocessing.exception_timeout));
    println!(
        "  Schedule: every {} after {}",
        humanize(reprocessing.fixed_rate),
        humanize(reprocessing.initial_delay)
    );
    println!();

    println!("{}", "Locking & executor:".bold());
    println!(
        "  Container lock timeout: {}",
        humanize(spec.locking.container_lock_timeout)
    );
    println!("  Max concurrent polls: {}", spec.executor.max_concurrent_polls);
    println!("  Shutdown timeout: {}", humanize(spec.executor.shutdown_timeout));
    println!();

    println!("{}", "Endpoints:".bold());
    println!(
        "  TSA: {}",
        spec.endpoints.tsa_url.as_deref().unwrap_or("(none)")
    );
    if spec.endpoints.ocsp_urls.is_empty() {
        println!("  OCSP: (none)");
    }
    for url in &spec.endpoints.ocsp_urls {
        println!("  OCSP: {}", url);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn humanize(duration: std::time::Duration) -> String {
    format!("{:?}", duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = GatewayConfigManifest::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_examples_template_sets_endpoints() {
        let config = GatewayConfigManifest::from_yaml_str(EXAMPLES_TEMPLATE).unwrap();
        assert!(config.spec.endpoints.tsa_url.is_some());
        assert!(!config.spec.endpoints.ocsp_urls.is_empty());
    }

    #[tokio::test]
    async fn test_generate_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("siga-config.yaml");

        generate(output.clone(), false).await.unwrap();

        let config = GatewayConfigManifest::from_yaml_file(&output).unwrap();
        assert_eq!(config.kind, "SigningGatewayConfig");
    }
}
