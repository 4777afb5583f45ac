// Configuration source loading.
//
// Priority order:
// 1. Explicit path (CLI --config flag)
// 2. Config file path from STUDIOFORGE_CONFIG
// 3. Default config files (./studioforge.toml, ./config.toml)
// 4. Environment fallback for region / account id

use crate::PlatformConfig;
use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

const ENV_CONFIG_PATH: &str = "STUDIOFORGE_CONFIG";
const ENV_REGION: &str = "AWS_REGION";
const ENV_ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";

const DEFAULT_PATHS: &[&str] = &["./studioforge.toml", "./config.toml"];

pub fn load_config(explicit_path: Option<&Path>) -> Result<PlatformConfig> {
    let content = read_config_file(explicit_path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<PlatformConfig> {
    let mut config: PlatformConfig =
        toml::from_str(content).context("Failed to parse configuration")?;
    apply_env_fallbacks(&mut config);
    config.validate()?;
    Ok(config)
}

fn read_config_file(explicit_path: Option<&Path>) -> Result<String> {
    if let Some(path) = explicit_path {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()));
    }

    if let Ok(path) = env::var(ENV_CONFIG_PATH) {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path));
    }

    for path in DEFAULT_PATHS {
        if Path::new(path).exists() {
            return std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path));
        }
    }

    bail!(
        "No configuration found. Pass --config, set {}, or create one of: {}",
        ENV_CONFIG_PATH,
        DEFAULT_PATHS.join(", ")
    )
}

/// Region and account id may come from the deployment environment
/// rather than the file.
fn apply_env_fallbacks(config: &mut PlatformConfig) {
    if config.region.as_deref().map_or(true, str::is_empty) {
        if let Ok(region) = env::var(ENV_REGION) {
            if !region.is_empty() {
                config.region = Some(region);
            }
        }
    }
    if config.account_id.as_deref().map_or(true, str::is_empty) {
        if let Ok(account) = env::var(ENV_ACCOUNT_ID) {
            if !account.is_empty() {
                config.account_id = Some(account);
            }
        }
    }
}
