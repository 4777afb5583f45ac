// studioforge-synth - Declarative platform synthesis
//
// Turns a validated PlatformConfig into resource documents plus a
// creation order. Synthesis is pure given the config and a network
// lookup: no provider calls, no environment reads. Each provisioner
// module owns one resource family; this module assembles them and
// wires the dependency graph.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use studioforge_config::PlatformConfig;

pub mod bucket;
pub mod domain;
pub mod error;
pub mod graph;
pub mod image;
pub mod key;
pub mod network;
pub mod resource;
pub mod role;

pub use error::{Result, SynthError};
pub use network::{ImportedNetwork, NetworkLookup, StaticNetworkLookup};
pub use resource::Resource;

use crate::bucket::BucketSpec;
use crate::domain::DomainSpec;
use crate::graph::DependencyGraph;
use crate::key::ResourceKeySpec;
use crate::network::NetworkSpec;
use crate::role::RoleSpec;

const NETWORK_ID: &str = "research-network";
const EXECUTION_ROLE_ID: &str = "platform-execution-role";
const STAGING_KEY_ID: &str = "staging-bucket-key";
const STAGING_BUCKET_ID: &str = "staging-bucket";

/// Immutable per-synthesis context, resolved once from config.
#[derive(Debug, Clone)]
pub struct SynthContext {
    pub account_id: String,
    pub region: String,
    pub environment: String,
    pub pipeline_role_name: String,
    pub default_key_admins: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl SynthContext {
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        let region = config
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| SynthError::missing("region"))?;
        let account_id = config
            .account_id
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SynthError::missing("account_id"))?;
        Ok(Self {
            account_id,
            region,
            environment: config.environment.clone(),
            pipeline_role_name: config.pipeline_role_name.clone(),
            default_key_admins: config.default_key_admins.clone(),
            tags: config.tags.clone(),
        })
    }

    pub fn root_arn(&self) -> String {
        format!("arn:aws:iam::{}:root", self.account_id)
    }

    pub fn role_arn(&self, role_name: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, role_name)
    }

    pub fn pipeline_role_arn(&self) -> String {
        self.role_arn(&self.pipeline_role_name)
    }
}

/// The full result of one synthesis run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthOutput {
    pub environment: String,
    pub region: String,
    pub account_id: String,
    /// Applied to every resource by the provisioning engine.
    pub tags: BTreeMap<String, String>,
    pub resources: Vec<Resource>,
    pub creation_order: Vec<String>,
}

/// Order-preserving dedup, first occurrence wins.
pub(crate) fn dedup_preserving(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Synthesize every resource the configuration declares.
pub fn synthesize(config: &PlatformConfig, lookup: &dyn NetworkLookup) -> Result<SynthOutput> {
    let ctx = SynthContext::from_config(config)?;
    info!(
        environment = %ctx.environment,
        region = %ctx.region,
        domains = config.notebook.domains.len(),
        "starting synthesis"
    );

    let mut resources: Vec<Resource> = Vec::new();
    let mut graph = DependencyGraph::new();

    // Network first: everything placed in it references its id.
    let network_spec = NetworkSpec {
        logical_id: NETWORK_ID.to_string(),
        existing_vpc_id: config.vpc.existing_vpc_id.clone(),
        cidr: config.vpc.cidr.clone(),
        subnet_size: config.vpc.subnet_size,
        private_subnets: config.vpc.private_subnets,
        public_subnets: config.vpc.public_subnets,
        vpc_name: config.vpc.vpc_name.clone(),
        public_subnet_ids: config.vpc.public_subnet_ids.clone(),
        private_subnet_ids: config.vpc.private_subnet_ids.clone(),
        isolated_subnet_ids: config.vpc.isolated_subnet_ids.clone(),
    };
    let network = network::provision_network(&ctx, &network_spec, lookup)?;
    collect(&mut resources, &mut graph, network.resources.clone());

    // One execution role shared by domains without policy overrides.
    let role_spec = RoleSpec::new(
        EXECUTION_ROLE_ID,
        format!("platform-sagemaker-execution-{}-role", ctx.environment),
    );
    let mut execution_role = role::provision_role(&ctx, &role_spec)?;

    // Staging bucket with its own key. The pipeline stages notebook
    // lifecycle assets here; the execution role reads them.
    let staging_bucket_name = format!("{}-sagemaker-staging", ctx.account_id);
    let mut staging_key_spec =
        ResourceKeySpec::new(STAGING_KEY_ID, "Staging bucket encryption key");
    staging_key_spec.alias = Some(format!("alias/{staging_bucket_name}-key"));
    staging_key_spec.key_users = vec![ctx.pipeline_role_arn()];
    // staged assets are reproducible, so the key need not outlive them
    staging_key_spec.removal_policy = resource::RemovalPolicy::Destroy;
    let mut staging_key = key::provision_key(&ctx, &staging_key_spec)?;
    staging_key.add_to_key_policy(&execution_role.arn);
    if let Some(policy) = execution_role.primary_policy_mut() {
        key::grant_access(policy, staging_key.arn());
    }
    let staging_key_ref = staging_key.key_ref().map(str::to_string);

    let mut bucket_spec = BucketSpec::new(STAGING_BUCKET_ID, staging_bucket_name);
    bucket_spec.key_ref = staging_key_ref.clone();
    bucket_spec.parameter_name = Some(format!(
        "/research/platform/{}/infra/bucket",
        ctx.environment
    ));
    let mut staging_bucket = bucket::provision_bucket(&bucket_spec)?;
    staging_bucket.grant_read_write(&ctx.pipeline_role_arn());
    staging_bucket.grant_read_write(&execution_role.arn);

    let execution_role_arn = execution_role.arn.clone();
    collect(&mut resources, &mut graph, execution_role.resources);
    collect(&mut resources, &mut graph, staging_key.into_resources());
    collect(&mut resources, &mut graph, staging_bucket.into_resources());
    graph.depends_on(
        &format!("{STAGING_BUCKET_ID}-param"),
        STAGING_BUCKET_ID,
    );

    // Custom kernel images, shared across domains by tag.
    let images = image::provision_images(&ctx, &config.notebook.images, EXECUTION_ROLE_ID);
    collect(&mut resources, &mut graph, images.resources.clone());

    // Domains, each with its own notebook-volume key. A domain carrying
    // policy overrides gets a dedicated execution role instead of the
    // shared one.
    for domain_config in &config.notebook.domains {
        let (role_ref, role_arn) = if domain_config.execution_policy_path.is_some()
            || domain_config.allowed_instance_types.is_some()
        {
            let mut dedicated_spec = RoleSpec::new(
                format!("{}-execution-role", domain_config.domain_name),
                format!("{}-default-execution-role", domain_config.domain_name),
            );
            dedicated_spec.execution_policy_path = domain_config
                .execution_policy_path
                .as_ref()
                .map(PathBuf::from);
            dedicated_spec.allowed_instance_types = domain_config.allowed_instance_types.clone();
            let dedicated = role::provision_role(&ctx, &dedicated_spec)?;
            let refs = (dedicated.role_ref.clone(), dedicated.arn.clone());
            collect(&mut resources, &mut graph, dedicated.resources);
            refs
        } else {
            (EXECUTION_ROLE_ID.to_string(), execution_role_arn.clone())
        };

        let mut key_spec = ResourceKeySpec::new(
            format!("{}-key", domain_config.domain_name),
            format!("Notebook volume key for {}", domain_config.domain_name),
        );
        key_spec.key_users = vec![ctx.pipeline_role_arn()];
        key_spec.key_services = vec!["sagemaker.amazonaws.com".to_string()];
        let mut domain_key = key::provision_key(&ctx, &key_spec)?;
        domain_key.add_to_key_policy(&role_arn);

        let domain_spec = DomainSpec {
            config: domain_config,
            network_ref: network.network_ref.clone(),
            subnet_ids: network.private_subnet_ids.clone(),
            execution_role_ref: role_ref,
            kms_key_arn: domain_key.arn().to_string(),
        };
        let provisioned = domain::provision_domain(&ctx, &domain_spec, &images)?;

        if let Some(key_ref) = domain_key.key_ref() {
            graph.depends_on(&provisioned.domain_ref, key_ref);
        }
        collect(&mut resources, &mut graph, domain_key.into_resources());
        collect(&mut resources, &mut graph, provisioned.resources);
    }

    let creation_order = graph.creation_order()?;
    info!(resources = resources.len(), "synthesis complete");
    Ok(SynthOutput {
        environment: ctx.environment,
        region: ctx.region,
        account_id: ctx.account_id,
        tags: ctx.tags,
        resources,
        creation_order,
    })
}

/// Append resources, registering each in the graph with the edges its
/// reference fields declare.
fn collect(resources: &mut Vec<Resource>, graph: &mut DependencyGraph, batch: Vec<Resource>) {
    for resource in batch {
        wire(graph, &resource);
        resources.push(resource);
    }
}

fn wire(graph: &mut DependencyGraph, resource: &Resource) {
    let id = resource.id().to_string();
    graph.add_node(&id);
    match resource {
        Resource::KeyAlias { key_ref, .. } => graph.depends_on(&id, key_ref),
        Resource::ManagedPolicy { role_refs, .. } => {
            for role_ref in role_refs {
                graph.depends_on(&id, role_ref);
            }
        }
        Resource::Network {
            flow_log_role_ref, ..
        } => {
            if let Some(role_ref) = flow_log_role_ref {
                graph.depends_on(&id, role_ref);
            }
        }
        Resource::SecurityGroup { network_ref, .. } => graph.depends_on(&id, network_ref),
        Resource::Bucket {
            encryption_key_ref, ..
        } => {
            if let Some(key_ref) = encryption_key_ref {
                graph.depends_on(&id, key_ref);
            }
        }
        Resource::Image { role_ref, .. } => graph.depends_on(&id, role_ref),
        Resource::ImageVersion { image_ref, .. } => graph.depends_on(&id, image_ref),
        Resource::Domain {
            network_ref,
            security_group_refs,
            execution_role_ref,
            custom_images,
            ..
        } => {
            graph.depends_on(&id, network_ref);
            graph.depends_on(&id, execution_role_ref);
            for group_ref in security_group_refs {
                graph.depends_on(&id, group_ref);
            }
            for image in custom_images {
                graph.depends_on(&id, &image.image_ref);
                graph.depends_on(&id, &image.app_image_config_ref);
            }
        }
        Resource::UserProfile { domain_ref, .. } => graph.depends_on(&id, domain_ref),
        Resource::Key { .. } | Resource::Parameter { .. } | Resource::AppImageConfig { .. }
        | Resource::Role { .. } => {}
    }
}
