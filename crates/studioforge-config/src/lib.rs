// studioforge-config - Declarative deployment configuration
//
// Supports configuration from multiple sources:
// 1. Config file path passed explicitly (CLI --config flag)
// 2. Config file path from STUDIOFORGE_CONFIG env var
// 3. Default config file locations (./studioforge.toml, ./config.toml)
// 4. Environment fallback for region and account id (AWS_REGION,
//    AWS_ACCOUNT_ID) when the file omits them

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod sources;
mod validation;

pub use validation::{parse_auth_mode, parse_network_access_mode, AuthMode, NetworkAccessMode};

/// Top-level deployment configuration, loaded once at process start and
/// treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Deployment region. Falls back to AWS_REGION when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Deployment account id. Falls back to AWS_ACCOUNT_ID when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Environment label, ex: "dev".
    pub environment: String,

    /// Name of the execution role the deployment pipeline assumes. Key
    /// policies must allow this role to manage provisioned keys.
    pub pipeline_role_name: String,

    /// Roles that always get key-admin access on provisioned keys. The
    /// account root is added automatically when this is empty.
    #[serde(default)]
    pub default_key_admins: Vec<String>,

    /// Tags applied to every synthesized resource.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub vpc: VpcConfig,

    pub notebook: NotebookConfig,
}

/// Network parameters: either an existing network to import or the
/// shape of a new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VpcConfig {
    /// Existing VPC id to import. When set, the creation parameters
    /// below are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_vpc_id: Option<String>,

    /// CIDR range for a created VPC. Default 10.0.0.0/16.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    /// Subnet size in CIDR bits. Default 24. No check is made that the
    /// size fits the VPC range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_size: Option<u8>,

    /// Number of private subnets to create. Default 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_subnets: Option<u32>,

    /// Number of public subnets to create. Default 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_subnets: Option<u32>,

    /// Explicit subnet ids to include alongside provider-reported ones.
    /// Mainly useful when importing an existing VPC, where the lookup
    /// may not surface every subnet.
    #[serde(default)]
    pub public_subnet_ids: Vec<String>,

    #[serde(default)]
    pub private_subnet_ids: Vec<String>,

    #[serde(default)]
    pub isolated_subnet_ids: Vec<String>,

    /// Name for a created VPC. Default ResearchPlatformVpc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_name: Option<String>,
}

/// Notebook platform configuration: domains plus the images made
/// available to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookConfig {
    /// Individual domain configuration.
    pub domains: Vec<DomainConfig>,

    /// Kernel images (stored in the container registry) to make
    /// available to domains.
    #[serde(default)]
    pub images: Vec<ImageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain_name: String,

    /// User names to create profiles for. Case-insensitive; profiles
    /// are created in all lowercase with separators normalized.
    #[serde(default)]
    pub users: Vec<String>,

    /// Path to a policy document that overrides the default execution
    /// role bundle for this domain only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_policy_path: Option<String>,

    /// Default instance type preselected for new notebook spaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_instance_type: Option<String>,

    /// Allow-list of instance types users may select. Enforced via a
    /// denial statement on the execution role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_instance_types: Option<Vec<String>>,

    /// Image tags (declared under [notebook.images]) to attach. The
    /// first becomes the default kernel image.
    #[serde(default)]
    pub custom_images: Vec<String>,

    /// IAM or SSO. Only IAM is tested. Validated locally against the
    /// fixed option set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<String>,

    /// PublicInternetOnly or VpcOnly. Validated locally against the
    /// fixed option set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_network_access_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Container registry repository to pull kernel images from. Must
    /// be in the same account and region as the domains.
    pub repository_name: String,

    /// Tags from the repository. Each declared tag becomes a selectable
    /// image; domains reference them by tag name.
    pub tags: Vec<String>,
}

impl PlatformConfig {
    /// Load configuration from the standard source chain.
    pub fn load() -> Result<Self> {
        sources::load_config(None)
    }

    /// Load configuration from a specific file path (CLI --config flag).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_config(Some(path.as_ref()))
    }

    /// Parse configuration from TOML content and apply env fallbacks.
    pub fn from_toml(content: &str) -> Result<Self> {
        sources::parse_config(content)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses() {
        let config: PlatformConfig = toml::from_str(
            r#"
            environment = "dev"
            pipeline_role_name = "deploy-pipeline-role"
            region = "us-east-1"
            account_id = "111122223333"

            [notebook]
            [[notebook.domains]]
            domain_name = "research"
            "#,
        )
        .unwrap();
        assert_eq!(config.environment, "dev");
        assert_eq!(config.notebook.domains.len(), 1);
        assert!(config.notebook.domains[0].users.is_empty());
        assert!(config.vpc.existing_vpc_id.is_none());
        assert!(config.default_key_admins.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let config: PlatformConfig = toml::from_str(
            r#"
            environment = "prod"
            pipeline_role_name = "deploy-pipeline-role"
            region = "eu-west-1"
            account_id = "111122223333"
            default_key_admins = ["arn:aws:iam::111122223333:role/console-admin"]

            [tags]
            team = "research-platform"

            [vpc]
            cidr = "10.1.0.0/16"
            private_subnets = 3
            public_subnets = 1
            subnet_size = 24

            [notebook]
            [[notebook.images]]
            repository_name = "kernels"
            tags = ["latest", "scipy"]

            [[notebook.domains]]
            domain_name = "research"
            users = ["Jane.Doe", "sam_smith"]
            custom_images = ["latest"]
            allowed_instance_types = ["ml.t3.medium"]
            auth_mode = "IAM"
            "#,
        )
        .unwrap();
        assert_eq!(config.vpc.private_subnets, Some(3));
        assert_eq!(config.notebook.images[0].tags.len(), 2);
        assert_eq!(config.notebook.domains[0].users.len(), 2);
        assert_eq!(config.tags.get("team").unwrap(), "research-platform");
    }
}
