//! Notebook domain and user-profile provisioning.
//!
//! A domain gets its own security group, references the shared
//! execution role and encryption key, and resolves its custom-image
//! tags against the synthesized image set. User names normalize to
//! profile identifiers; two names landing on the same identifier is an
//! authoring error, not a silent overwrite.

use std::collections::BTreeMap;

use tracing::info;

use studioforge_config::DomainConfig;

use crate::error::{Result, SynthError};
use crate::image::{self, ProvisionedImages, DEFAULT_KERNEL_INSTANCE};
use crate::resource::{CustomImageRef, IngressPeer, IngressRule, Resource};
use crate::SynthContext;

const DEFAULT_AUTH_MODE: &str = "IAM";
const DEFAULT_NETWORK_ACCESS: &str = "VpcOnly";
const DEFAULT_LANDING_URI: &str = "studio::";

/// Inputs assembled by the caller: config plus references to resources
/// provisioned earlier in the same synthesis.
#[derive(Debug, Clone)]
pub struct DomainSpec<'a> {
    pub config: &'a DomainConfig,
    pub network_ref: String,
    pub subnet_ids: Vec<String>,
    pub execution_role_ref: String,
    pub kms_key_arn: String,
}

#[derive(Debug)]
pub struct ProvisionedDomain {
    pub domain_ref: String,
    pub security_group_ref: String,
    /// Image logical ids this domain references, for ordering.
    pub image_refs: Vec<String>,
    pub resources: Vec<Resource>,
}

/// Lowercase with word separators collapsed to hyphens. Matches the
/// identifier rules for profile names.
pub fn normalize_user_name(name: &str) -> String {
    name.replace(['.', '_'], "-").to_lowercase()
}

fn security_group(domain_name: &str, network_ref: &str) -> (String, Resource) {
    let id = format!("{domain_name}-sec-grp");
    let resource = Resource::SecurityGroup {
        id: id.clone(),
        group_name: id.clone(),
        network_ref: network_ref.to_string(),
        allow_all_outbound: true,
        ingress: vec![
            IngressRule {
                peer: IngressPeer::AnyIpv4,
                from_port: 443,
                to_port: 443,
                description: "HTTPS".to_string(),
            },
            IngressRule {
                peer: IngressPeer::GroupSelf,
                from_port: 2049,
                to_port: 2049,
                description: "NFS between domain apps".to_string(),
            },
            IngressRule {
                peer: IngressPeer::GroupSelf,
                from_port: 8192,
                to_port: 65535,
                description: "Kernel and app ephemeral ports".to_string(),
            },
        ],
    };
    (id, resource)
}

fn resolve_custom_images(
    config: &DomainConfig,
    images: &ProvisionedImages,
) -> Result<Vec<CustomImageRef>> {
    config
        .custom_images
        .iter()
        .map(|tag| {
            let handle = images
                .get(tag)
                .ok_or_else(|| SynthError::reference_not_found(&config.domain_name, tag))?;
            Ok(CustomImageRef {
                image_ref: handle.image_ref.clone(),
                app_image_config_ref: handle.app_image_config_ref.clone(),
            })
        })
        .collect()
}

fn user_profiles(config: &DomainConfig, domain_ref: &str) -> Result<Vec<Resource>> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let mut profiles = Vec::with_capacity(config.users.len());
    for user in &config.users {
        let normalized = normalize_user_name(user);
        if let Some(first) = seen.get(&normalized) {
            return Err(SynthError::DuplicateUser {
                first: first.clone(),
                second: user.clone(),
                normalized,
            });
        }
        seen.insert(normalized.clone(), user.clone());
        profiles.push(Resource::UserProfile {
            id: format!("{domain_ref}-{normalized}"),
            domain_ref: domain_ref.to_string(),
            user_profile_name: normalized,
        });
    }
    Ok(profiles)
}

pub fn provision_domain(
    ctx: &SynthContext,
    spec: &DomainSpec<'_>,
    images: &ProvisionedImages,
) -> Result<ProvisionedDomain> {
    let config = spec.config;
    let domain_ref = format!("{}-domain", config.domain_name);
    info!(domain = %config.domain_name, users = config.users.len(), "synthesizing domain");

    let (security_group_ref, security_group) = security_group(&config.domain_name, &spec.network_ref);
    let custom_images = resolve_custom_images(config, images)?;
    let (studio_image_arn, _) = image::default_studio_image(&ctx.region)?;
    let default_kernel_image_arn = if custom_images.is_empty() {
        Some(image::default_kernel_image_arn(&ctx.region)?)
    } else {
        None
    };
    let default_instance_type = config
        .default_instance_type
        .clone()
        .unwrap_or_else(|| DEFAULT_KERNEL_INSTANCE.to_string());

    let image_refs: Vec<String> = custom_images
        .iter()
        .flat_map(|image| {
            [
                image.image_ref.clone(),
                image.app_image_config_ref.clone(),
            ]
        })
        .collect();

    let domain = Resource::Domain {
        id: domain_ref.clone(),
        domain_name: config.domain_name.clone(),
        auth_mode: config
            .auth_mode
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTH_MODE.to_string()),
        app_network_access_type: config
            .app_network_access_type
            .clone()
            .unwrap_or_else(|| DEFAULT_NETWORK_ACCESS.to_string()),
        network_ref: spec.network_ref.clone(),
        subnet_ids: spec.subnet_ids.clone(),
        security_group_refs: vec![security_group_ref.clone()],
        execution_role_ref: spec.execution_role_ref.clone(),
        kms_key_arn: spec.kms_key_arn.clone(),
        studio_image_arn,
        default_instance_type,
        default_kernel_image_arn,
        custom_images,
        studio_web_portal: true,
        default_landing_uri: DEFAULT_LANDING_URI.to_string(),
    };

    let mut resources = vec![security_group, domain];
    resources.extend(user_profiles(config, &domain_ref)?);

    Ok(ProvisionedDomain {
        domain_ref,
        security_group_ref,
        image_refs,
        resources,
    })
}
