// studioforge entry point
//
// Loads the declarative platform configuration, synthesizes resource
// documents plus a creation order, and writes the result as JSON for
// the provisioning engine. Synthesis is a synchronous definition-time
// pass; no remote calls happen here.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use studioforge_config::PlatformConfig;
use studioforge_synth::{synthesize, ImportedNetwork, StaticNetworkLookup, SynthOutput};

#[derive(Parser)]
#[command(name = "studioforge")]
#[command(version)]
#[command(about = "Synthesize research platform resources from declarative config", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Write synthesized output to this file instead of stdout
    #[arg(short, long, value_name = "FILE", global = true)]
    out: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize resource documents (default if no subcommand given)
    Synth,
    /// Load and validate the configuration without synthesizing
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = load_config(&cli)?;
    match cli.command {
        Some(Commands::Validate) => {
            // load_config already validated; reaching here means success
            println!(
                "configuration ok: {} domain(s), {} image repositorie(s)",
                config.notebook.domains.len(),
                config.notebook.images.len()
            );
            Ok(())
        }
        Some(Commands::Synth) | None => run_synth(&cli, &config),
    }
}

fn load_config(cli: &Cli) -> Result<PlatformConfig> {
    match &cli.config {
        Some(path) => PlatformConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => PlatformConfig::load().context("Failed to load configuration"),
    }
}

fn run_synth(cli: &Cli, config: &PlatformConfig) -> Result<()> {
    info!(
        environment = %config.environment,
        domains = config.notebook.domains.len(),
        "synthesizing platform"
    );

    let lookup = lookup_from_config(config);
    let output = synthesize(config, &lookup).context("Synthesis failed")?;
    write_output(cli, &output)
}

/// Offline stand-in for a provider lookup: when importing an existing
/// network, the config-declared subnet ids are what we know about it.
fn lookup_from_config(config: &PlatformConfig) -> StaticNetworkLookup {
    let mut lookup = StaticNetworkLookup::new();
    if let Some(vpc_id) = config.vpc.existing_vpc_id.as_deref().filter(|id| !id.is_empty()) {
        lookup.insert(ImportedNetwork {
            vpc_id: vpc_id.to_string(),
            public_subnet_ids: config.vpc.public_subnet_ids.clone(),
            private_subnet_ids: config.vpc.private_subnet_ids.clone(),
            isolated_subnet_ids: config.vpc.isolated_subnet_ids.clone(),
        });
    }
    lookup
}

fn write_output(cli: &Cli, output: &SynthOutput) -> Result<()> {
    let json = serde_json::to_string_pretty(output).context("Failed to serialize output")?;
    match &cli.out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!(
                path = %path.display(),
                resources = output.resources.len(),
                "synthesis written"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write as _;

    #[test]
    fn test_cli_declaration_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_file_to_synthesis_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            environment = "dev"
            pipeline_role_name = "deploy-pipeline-role"
            region = "us-east-1"
            account_id = "111122223333"

            [notebook]
            [[notebook.domains]]
            domain_name = "research"
            "#
        )
        .unwrap();

        let config = PlatformConfig::load_from_path(file.path()).unwrap();
        let output = synthesize(&config, &lookup_from_config(&config)).unwrap();
        assert!(!output.creation_order.is_empty());
        assert_eq!(output.account_id, "111122223333");
    }

    #[test]
    fn test_imported_network_lookup_uses_config_subnets() {
        let config = PlatformConfig::from_toml(
            r#"
            environment = "dev"
            pipeline_role_name = "deploy-pipeline-role"
            region = "us-east-1"
            account_id = "111122223333"

            [vpc]
            existing_vpc_id = "vpc-1234"
            private_subnet_ids = ["subnet-priv-1"]

            [notebook]
            [[notebook.domains]]
            domain_name = "research"
            "#,
        )
        .unwrap();
        let output = synthesize(&config, &lookup_from_config(&config)).unwrap();
        assert!(output
            .creation_order
            .iter()
            .all(|id| id != "vpc-flow-logs-role"));
    }
}
