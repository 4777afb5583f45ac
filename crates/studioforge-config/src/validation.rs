// Configuration validation
//
// Validates that required fields are present and enumerated fields hold
// values from the fixed option sets the target provider understands.
// Checking here means authoring mistakes surface before any resource
// document is built, not at provisioning-engine validation time.

use crate::{DomainConfig, ImageConfig, PlatformConfig, VpcConfig};
use anyhow::{bail, Result};
use tracing::warn;

/// IAM or SSO authentication for a domain. Only IAM is tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Iam,
    Sso,
}

/// Whether notebook apps run with public internet access or inside the
/// network only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkAccessMode {
    #[default]
    PublicInternetOnly,
    VpcOnly,
}

pub fn parse_auth_mode(value: &str) -> Result<AuthMode> {
    match value {
        "IAM" => Ok(AuthMode::Iam),
        "SSO" => Ok(AuthMode::Sso),
        _ => bail!(
            "Invalid auth_mode '{}'. Supported: IAM, SSO",
            value
        ),
    }
}

pub fn parse_network_access_mode(value: &str) -> Result<NetworkAccessMode> {
    match value {
        "PublicInternetOnly" => Ok(NetworkAccessMode::PublicInternetOnly),
        "VpcOnly" => Ok(NetworkAccessMode::VpcOnly),
        _ => bail!(
            "Invalid app_network_access_type '{}'. Supported: PublicInternetOnly, VpcOnly",
            value
        ),
    }
}

pub fn validate_config(config: &PlatformConfig) -> Result<()> {
    if config.region.as_deref().map_or(true, str::is_empty) {
        bail!("region is required (set in config or via AWS_REGION)");
    }
    if config.account_id.as_deref().map_or(true, str::is_empty) {
        bail!("account_id is required (set in config or via AWS_ACCOUNT_ID)");
    }
    if config.environment.is_empty() {
        bail!("environment must not be empty");
    }
    if config.pipeline_role_name.is_empty() {
        bail!("pipeline_role_name must not be empty");
    }

    validate_vpc_config(&config.vpc)?;

    for image in &config.notebook.images {
        validate_image_config(image)?;
    }
    for domain in &config.notebook.domains {
        validate_domain_config(domain)?;
    }
    Ok(())
}

fn validate_vpc_config(config: &VpcConfig) -> Result<()> {
    if let Some(0) = config.private_subnets {
        bail!("vpc.private_subnets must be greater than 0 when set");
    }
    if let Some(0) = config.public_subnets {
        bail!("vpc.public_subnets must be greater than 0 when set");
    }
    if let Some(size) = config.subnet_size {
        // /16 matches the default VPC CIDR; smaller masks cannot fit
        if !(16..=28).contains(&size) {
            bail!("vpc.subnet_size must be between 16 and 28, got {}", size);
        }
    }
    if config.existing_vpc_id.as_deref().is_some_and(str::is_empty) {
        warn!("vpc.existing_vpc_id is set but empty; a new VPC will be created");
    }
    Ok(())
}

fn validate_image_config(config: &ImageConfig) -> Result<()> {
    if config.repository_name.is_empty() {
        bail!("notebook.images.repository_name must not be empty");
    }
    if config.tags.is_empty() {
        bail!(
            "notebook.images entry '{}' declares no tags; declare at least one",
            config.repository_name
        );
    }
    if config.tags.iter().any(|t| t.is_empty()) {
        bail!(
            "notebook.images entry '{}' contains an empty tag",
            config.repository_name
        );
    }
    Ok(())
}

fn validate_domain_config(config: &DomainConfig) -> Result<()> {
    if config.domain_name.is_empty() {
        bail!("notebook.domains.domain_name must not be empty");
    }
    if let Some(mode) = config.auth_mode.as_deref() {
        parse_auth_mode(mode)?;
    }
    if let Some(mode) = config.app_network_access_type.as_deref() {
        parse_network_access_mode(mode)?;
    }
    if let Some(allowed) = &config.allowed_instance_types {
        if allowed.is_empty() {
            bail!(
                "domain '{}' sets allowed_instance_types to an empty list, which would deny every instance type",
                config.domain_name
            );
        }
    }
    Ok(())
}
