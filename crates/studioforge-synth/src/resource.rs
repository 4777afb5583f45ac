//! Synthesized resource documents.
//!
//! Synthesis produces a flat list of these documents plus a creation
//! order. Each variant carries exactly the properties the provisioning
//! engine needs; cross-resource links are by logical id (`*_ref`
//! fields), never by embedded copies.

use serde::{Deserialize, Serialize};
use studioforge_policy::PolicyDocument;

/// What happens to stateful resources when the deployment is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    /// Keep the resource and its data. Applied to keys and buckets.
    Retain,
    /// Delete along with the deployment.
    Destroy,
}

/// Subnet placement class inside a created network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubnetKind {
    Public,
    PrivateWithEgress,
}

/// One subnet group in a created network layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetBlock {
    pub name: String,
    pub kind: SubnetKind,
    /// Mask size in CIDR bits.
    pub cidr_mask: u8,
    pub map_public_ip_on_launch: bool,
}

/// Source address for a security-group ingress rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IngressPeer {
    /// Open to 0.0.0.0/0.
    AnyIpv4,
    /// Traffic from members of the same group.
    GroupSelf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    pub peer: IngressPeer,
    pub from_port: u16,
    pub to_port: u16,
    pub description: String,
}

/// Reference pairing a kernel image with its app configuration, as
/// attached to a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomImageRef {
    pub image_ref: String,
    pub app_image_config_ref: String,
}

/// A single synthesized resource.
///
/// Serialized with an explicit `type` tag so the output is a
/// self-describing document stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Resource {
    #[serde(rename_all = "camelCase")]
    Key {
        id: String,
        description: String,
        enable_key_rotation: bool,
        removal_policy: RemovalPolicy,
        policy: PolicyDocument,
    },

    #[serde(rename_all = "camelCase")]
    KeyAlias {
        id: String,
        alias_name: String,
        key_ref: String,
    },

    #[serde(rename_all = "camelCase")]
    Role {
        id: String,
        role_name: String,
        assume_role_policy: PolicyDocument,
        managed_policy_arns: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    ManagedPolicy {
        id: String,
        policy_name: String,
        document: PolicyDocument,
        /// Logical ids of roles this policy attaches to.
        role_refs: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    Network {
        id: String,
        /// Set when importing an existing network; creation fields are
        /// then advisory only.
        existing_vpc_id: Option<String>,
        vpc_name: String,
        cidr: String,
        max_azs: u32,
        nat_gateways: u32,
        subnet_blocks: Vec<SubnetBlock>,
        /// Logical id of the flow-log delivery role, when logs are on.
        flow_log_role_ref: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    SecurityGroup {
        id: String,
        group_name: String,
        network_ref: String,
        allow_all_outbound: bool,
        ingress: Vec<IngressRule>,
    },

    #[serde(rename_all = "camelCase")]
    Bucket {
        id: String,
        bucket_name: String,
        versioned: bool,
        enforce_ssl: bool,
        block_public_access: bool,
        removal_policy: RemovalPolicy,
        encryption_key_ref: Option<String>,
        policy: Option<PolicyDocument>,
    },

    #[serde(rename_all = "camelCase")]
    Parameter {
        id: String,
        parameter_name: String,
        string_value: String,
    },

    #[serde(rename_all = "camelCase")]
    Image {
        id: String,
        image_name: String,
        /// Role the notebook service assumes to pull the image.
        role_ref: String,
    },

    #[serde(rename_all = "camelCase")]
    ImageVersion {
        id: String,
        image_ref: String,
        /// Full registry URI of the container image.
        base_image: String,
    },

    #[serde(rename_all = "camelCase")]
    AppImageConfig {
        id: String,
        config_name: String,
        kernel_name: String,
    },

    #[serde(rename_all = "camelCase")]
    Domain {
        id: String,
        domain_name: String,
        auth_mode: String,
        app_network_access_type: String,
        network_ref: String,
        subnet_ids: Vec<String>,
        security_group_refs: Vec<String>,
        execution_role_ref: String,
        /// ARN of the encryption key for notebook volumes. May belong
        /// to an imported key outside this synthesis.
        kms_key_arn: String,
        studio_image_arn: String,
        default_instance_type: String,
        /// Built-in kernel image, set only when no custom images are
        /// attached. Otherwise the first custom image is the default.
        default_kernel_image_arn: Option<String>,
        custom_images: Vec<CustomImageRef>,
        studio_web_portal: bool,
        default_landing_uri: String,
    },

    #[serde(rename_all = "camelCase")]
    UserProfile {
        id: String,
        domain_ref: String,
        user_profile_name: String,
    },
}

impl Resource {
    /// Logical id, unique across one synthesis.
    pub fn id(&self) -> &str {
        match self {
            Resource::Key { id, .. }
            | Resource::KeyAlias { id, .. }
            | Resource::Role { id, .. }
            | Resource::ManagedPolicy { id, .. }
            | Resource::Network { id, .. }
            | Resource::SecurityGroup { id, .. }
            | Resource::Bucket { id, .. }
            | Resource::Parameter { id, .. }
            | Resource::Image { id, .. }
            | Resource::ImageVersion { id, .. }
            | Resource::AppImageConfig { id, .. }
            | Resource::Domain { id, .. }
            | Resource::UserProfile { id, .. } => id,
        }
    }

    /// Short name of the resource kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Key { .. } => "key",
            Resource::KeyAlias { .. } => "key-alias",
            Resource::Role { .. } => "role",
            Resource::ManagedPolicy { .. } => "managed-policy",
            Resource::Network { .. } => "network",
            Resource::SecurityGroup { .. } => "security-group",
            Resource::Bucket { .. } => "bucket",
            Resource::Parameter { .. } => "parameter",
            Resource::Image { .. } => "image",
            Resource::ImageVersion { .. } => "image-version",
            Resource::AppImageConfig { .. } => "app-image-config",
            Resource::Domain { .. } => "domain",
            Resource::UserProfile { .. } => "user-profile",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_serializes_with_type_tag() {
        let resource = Resource::Parameter {
            id: "staging-bucket-param".to_string(),
            parameter_name: "/research/platform/dev/infra/bucket".to_string(),
            string_value: "111122223333-sagemaker-staging".to_string(),
        };
        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["type"], "parameter");
        assert_eq!(value["parameterName"], "/research/platform/dev/infra/bucket");
        assert_eq!(resource.id(), "staging-bucket-param");
        assert_eq!(resource.kind(), "parameter");
    }

    #[test]
    fn test_subnet_kind_serializes_screaming_snake() {
        let block = SubnetBlock {
            name: "private1".to_string(),
            kind: SubnetKind::PrivateWithEgress,
            cidr_mask: 24,
            map_public_ip_on_launch: false,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["kind"], "PRIVATE_WITH_EGRESS");
        assert_eq!(value["mapPublicIpOnLaunch"], false);
    }
}
