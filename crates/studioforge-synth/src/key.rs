//! Encryption-key provisioning.
//!
//! Builds the key policy before the key document exists: admins are
//! resolved from config defaults plus per-key extras, one variant
//! statement set is appended based on which principal lists are
//! populated, and the merged template hydrates in a single strict pass.

use serde_json::json;
use tracing::debug;

use studioforge_policy::{
    builtin, select_key_policy_variant, HydrationContext, Placeholder, PolicyDocument,
    PolicyStatement, PolicyTemplate,
};

use crate::error::Result;
use crate::resource::{RemovalPolicy, Resource};
use crate::SynthContext;

const KEY_USE_ACTIONS: &[&str] = &[
    "kms:Encrypt",
    "kms:Decrypt",
    "kms:ReEncryptFrom",
    "kms:ReEncryptTo",
    "kms:GenerateDataKey*",
    "kms:DescribeKey",
];

const KEY_GRANT_ACTIONS: &[&str] = &["kms:CreateGrant", "kms:ListGrants", "kms:RevokeGrant"];

/// Inputs for one encryption key.
#[derive(Debug, Clone)]
pub struct ResourceKeySpec {
    pub logical_id: String,
    pub description: String,
    pub alias: Option<String>,
    /// Role ARNs granted day-to-day use of the key.
    pub key_users: Vec<String>,
    /// Service principals granted use of the key.
    pub key_services: Vec<String>,
    /// Admin ARNs beyond the configured defaults.
    pub key_admins: Vec<String>,
    /// When false, the account root is not appended to the admin set.
    pub trust_account_identities: bool,
    /// Base policy template overriding the built-in default. Variant
    /// statements are appended to it the same way.
    pub policy_template: Option<PolicyTemplate>,
    pub removal_policy: RemovalPolicy,
    /// Import this key instead of creating one.
    pub existing_key_arn: Option<String>,
}

impl ResourceKeySpec {
    pub fn new(logical_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            description: description.into(),
            alias: None,
            key_users: Vec::new(),
            key_services: Vec::new(),
            key_admins: Vec::new(),
            trust_account_identities: true,
            policy_template: None,
            removal_policy: RemovalPolicy::Retain,
            existing_key_arn: None,
        }
    }
}

/// A key the rest of the synthesis can reference. Imported keys carry
/// only an ARN; created keys carry an editable policy until the final
/// resource documents are materialized.
#[derive(Debug)]
pub enum ProvisionedKey {
    Existing {
        arn: String,
    },
    Created {
        logical_id: String,
        alias: Option<String>,
        description: String,
        policy: PolicyDocument,
        removal_policy: RemovalPolicy,
        arn: String,
        /// Root account ARN joined to every grant written into the key
        /// policy, as a lockout safety net. None when the spec opted out
        /// of trusting account identities.
        root_principal: Option<String>,
    },
}

impl ProvisionedKey {
    pub fn arn(&self) -> &str {
        match self {
            ProvisionedKey::Existing { arn } | ProvisionedKey::Created { arn, .. } => arn,
        }
    }

    /// Logical id to depend on. None for imported keys, which already
    /// exist outside this synthesis.
    pub fn key_ref(&self) -> Option<&str> {
        match self {
            ProvisionedKey::Existing { .. } => None,
            ProvisionedKey::Created { logical_id, .. } => Some(logical_id),
        }
    }

    /// Write use and scoped grant-management statements for a principal
    /// into the key's resource policy. The account root rides along in
    /// each statement unless trust was opted out, so an admin can always
    /// recover the key. No-op on imported keys, whose policies are not
    /// ours to edit.
    pub fn add_to_key_policy(&mut self, principal_arn: &str) {
        match self {
            ProvisionedKey::Existing { arn } => {
                debug!(key = %arn, "imported key policy is not editable, skipping grant");
            }
            ProvisionedKey::Created {
                policy,
                root_principal,
                ..
            } => {
                policy.append(use_and_grant_statements(
                    principal_arn,
                    root_principal.as_deref(),
                ));
            }
        }
    }

    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        if let ProvisionedKey::Created { policy, .. } = self {
            policy.append([statement]);
        }
    }

    pub fn into_resources(self) -> Vec<Resource> {
        match self {
            ProvisionedKey::Existing { .. } => Vec::new(),
            ProvisionedKey::Created {
                logical_id,
                alias,
                description,
                policy,
                removal_policy,
                ..
            } => {
                let mut resources = vec![Resource::Key {
                    id: logical_id.clone(),
                    description,
                    enable_key_rotation: true,
                    removal_policy,
                    policy,
                }];
                if let Some(alias_name) = alias {
                    resources.push(Resource::KeyAlias {
                        id: format!("{logical_id}-alias"),
                        alias_name,
                        key_ref: logical_id,
                    });
                }
                resources
            }
        }
    }
}

pub fn provision_key(ctx: &SynthContext, spec: &ResourceKeySpec) -> Result<ProvisionedKey> {
    if let Some(arn) = &spec.existing_key_arn {
        debug!(key = %spec.logical_id, arn = %arn, "importing existing key");
        return Ok(ProvisionedKey::Existing { arn: arn.clone() });
    }

    let admins = resolve_admins(ctx, spec);
    let services: Vec<String> = spec
        .key_services
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();
    let variant = select_key_policy_variant(&spec.key_admins, &spec.key_services);

    // The variant's use statement names a single principal; additional
    // key users get their own statements below.
    let role_arn = spec
        .key_users
        .first()
        .cloned()
        .unwrap_or_else(|| ctx.root_arn());

    let hydration = HydrationContext::new()
        .scalar(Placeholder::AccountId, &ctx.account_id)
        .scalar(Placeholder::Region, &ctx.region)
        .scalar(Placeholder::RoleName, &ctx.pipeline_role_name)
        .scalar(Placeholder::RoleArn, role_arn)
        .list(Placeholder::KeyAdmins, admins)
        .list(Placeholder::Service, services);

    let base = spec
        .policy_template
        .clone()
        .unwrap_or_else(|| builtin::default_key_policy().clone());
    let template = base.with_appended_statements(builtin::key_policy_variant(variant));
    let mut policy = template.hydrate_document(&hydration)?;

    let root_principal = spec
        .trust_account_identities
        .then(|| ctx.root_arn());
    for user in spec.key_users.iter().skip(1) {
        policy.append(use_and_grant_statements(user, root_principal.as_deref()));
    }

    Ok(ProvisionedKey::Created {
        arn: format!(
            "arn:aws:kms:{}:{}:key/{}",
            ctx.region, ctx.account_id, spec.logical_id
        ),
        logical_id: spec.logical_id.clone(),
        alias: spec.alias.clone(),
        description: spec.description.clone(),
        policy,
        removal_policy: spec.removal_policy,
        root_principal,
    })
}

/// Append the use and grant-management statement pair for a key to an
/// identity policy (the role-side counterpart of `add_to_key_policy`).
pub fn grant_access(policy: &mut PolicyDocument, key_arn: &str) {
    policy.append([
        PolicyStatement::allow(KEY_USE_ACTIONS, &[key_arn]),
        PolicyStatement::allow(KEY_GRANT_ACTIONS, &[key_arn])
            .with_condition(json!({ "Bool": { "kms:GrantIsForAWSResource": "true" } })),
    ]);
}

/// Admin set: configured defaults (account root when none), per-key
/// extras, then the account root unless opted out. Order-preserving
/// dedup keeps the first occurrence.
fn resolve_admins(ctx: &SynthContext, spec: &ResourceKeySpec) -> Vec<String> {
    let mut admins = if ctx.default_key_admins.is_empty() {
        vec![ctx.root_arn()]
    } else {
        ctx.default_key_admins.clone()
    };
    admins.extend(spec.key_admins.iter().cloned());
    if spec.trust_account_identities {
        admins.push(ctx.root_arn());
    }
    crate::dedup_preserving(admins)
}

fn use_and_grant_statements(principal_arn: &str, root_arn: Option<&str>) -> [PolicyStatement; 2] {
    let mut arns = vec![principal_arn.to_string()];
    if let Some(root) = root_arn {
        if root != principal_arn {
            arns.push(root.to_string());
        }
    }
    let principal = json!({ "AWS": arns });
    [
        PolicyStatement::allow(KEY_USE_ACTIONS, &["*"]).with_principal(principal.clone()),
        PolicyStatement::allow(KEY_GRANT_ACTIONS, &["*"])
            .with_principal(principal)
            .with_condition(json!({ "Bool": { "kms:GrantIsForAWSResource": "true" } })),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;

    #[test]
    fn test_created_key_policy_contains_base_and_variant() {
        let ctx = test_context();
        let spec = ResourceKeySpec::new("staging-key", "Staging bucket key");
        let key = provision_key(&ctx, &spec).unwrap();
        let ProvisionedKey::Created { policy, .. } = &key else {
            panic!("expected a created key");
        };
        // base policy (2) + user variant (1)
        assert_eq!(policy.statement.len(), 3);
        assert_eq!(policy.statement[0].sid.as_deref(), Some("KeyAdministration"));
        assert_eq!(policy.statement[2].sid.as_deref(), Some("KeyUse"));
    }

    #[test]
    fn test_admins_default_to_account_root() {
        let ctx = test_context();
        let spec = ResourceKeySpec::new("k", "d");
        let admins = resolve_admins(&ctx, &spec);
        assert_eq!(admins, vec![ctx.root_arn()]);
    }

    #[test]
    fn test_configured_admins_keep_root_appended_once() {
        let mut ctx = test_context();
        ctx.default_key_admins = vec!["arn:aws:iam::111122223333:role/console-admin".to_string()];
        let mut spec = ResourceKeySpec::new("k", "d");
        spec.key_admins = vec!["arn:aws:iam::111122223333:role/console-admin".to_string()];
        let admins = resolve_admins(&ctx, &spec);
        assert_eq!(
            admins,
            vec![
                "arn:aws:iam::111122223333:role/console-admin".to_string(),
                ctx.root_arn(),
            ]
        );
    }

    #[test]
    fn test_untrusted_account_identities_omit_root() {
        let mut ctx = test_context();
        ctx.default_key_admins = vec!["arn:aws:iam::111122223333:role/console-admin".to_string()];
        let mut spec = ResourceKeySpec::new("k", "d");
        spec.trust_account_identities = false;
        let admins = resolve_admins(&ctx, &spec);
        assert!(!admins.contains(&ctx.root_arn()));
    }

    #[test]
    fn test_existing_arn_imports_without_resources() {
        let ctx = test_context();
        let mut spec = ResourceKeySpec::new("k", "d");
        spec.existing_key_arn =
            Some("arn:aws:kms:us-east-1:111122223333:key/abcd".to_string());
        let key = provision_key(&ctx, &spec).unwrap();
        assert_eq!(key.arn(), "arn:aws:kms:us-east-1:111122223333:key/abcd");
        assert!(key.key_ref().is_none());
        assert!(key.into_resources().is_empty());
    }

    #[test]
    fn test_add_to_key_policy_appends_scoped_grant_statements() {
        let ctx = test_context();
        let spec = ResourceKeySpec::new("k", "d");
        let mut key = provision_key(&ctx, &spec).unwrap();
        let before = match &key {
            ProvisionedKey::Created { policy, .. } => policy.statement.len(),
            _ => panic!("expected a created key"),
        };
        key.add_to_key_policy("arn:aws:iam::111122223333:role/worker");
        let ProvisionedKey::Created { policy, .. } = &key else {
            panic!("expected a created key");
        };
        assert_eq!(policy.statement.len(), before + 2);
        let grant = &policy.statement[before + 1];
        assert!(grant.action.contains("kms:CreateGrant"));
        assert_eq!(
            grant.condition.as_ref().unwrap()["Bool"]["kms:GrantIsForAWSResource"],
            "true"
        );
    }

    #[test]
    fn test_key_policy_grants_include_root_principal() {
        let ctx = test_context();
        let spec = ResourceKeySpec::new("k", "d");
        let mut key = provision_key(&ctx, &spec).unwrap();
        key.add_to_key_policy("arn:aws:iam::111122223333:role/worker");
        let ProvisionedKey::Created { policy, .. } = &key else {
            panic!("expected a created key");
        };
        // both the use and the grant statement keep the account root
        // alongside the grantee so admins can always recover the key
        for statement in &policy.statement[policy.statement.len() - 2..] {
            let aws = statement.principal.as_ref().unwrap()["AWS"]
                .as_array()
                .unwrap()
                .clone();
            assert!(aws.iter().any(|p| p == "arn:aws:iam::111122223333:role/worker"));
            assert!(aws.iter().any(|p| *p == ctx.root_arn()));
        }
    }

    #[test]
    fn test_untrusted_key_grants_carry_only_the_grantee() {
        let ctx = test_context();
        let mut spec = ResourceKeySpec::new("k", "d");
        spec.trust_account_identities = false;
        let mut key = provision_key(&ctx, &spec).unwrap();
        key.add_to_key_policy("arn:aws:iam::111122223333:role/worker");
        let ProvisionedKey::Created { policy, .. } = &key else {
            panic!("expected a created key");
        };
        let grant = policy.statement.last().unwrap();
        assert_eq!(
            grant.principal.as_ref().unwrap()["AWS"],
            json!(["arn:aws:iam::111122223333:role/worker"])
        );
    }

    #[test]
    fn test_service_principals_select_service_variant() {
        let ctx = test_context();
        let mut spec = ResourceKeySpec::new("k", "d");
        spec.key_services = vec!["sagemaker.amazonaws.com".to_string()];
        let key = provision_key(&ctx, &spec).unwrap();
        let ProvisionedKey::Created { policy, .. } = &key else {
            panic!("expected a created key");
        };
        let has_service_principal = policy.statement.iter().any(|s| {
            s.principal
                .as_ref()
                .and_then(|p| p.get("Service"))
                .is_some()
        });
        assert!(has_service_principal);
    }

    #[test]
    fn test_grant_access_scopes_statements_to_key_arn() {
        let mut policy = PolicyDocument::new();
        grant_access(&mut policy, "arn:aws:kms:us-east-1:111122223333:key/k");
        assert_eq!(policy.statement.len(), 2);
        assert!(policy.statement[0].action.contains("kms:Decrypt"));
        assert!(policy.statement[0]
            .resource
            .as_ref()
            .unwrap()
            .contains("arn:aws:kms:us-east-1:111122223333:key/k"));
        // identity-policy side carries no principal
        assert!(policy.statement[0].principal.is_none());
    }

    #[test]
    fn test_explicit_template_replaces_builtin_base() {
        let ctx = test_context();
        let mut spec = ResourceKeySpec::new("k", "d");
        spec.policy_template = Some(
            PolicyTemplate::parse(
                r#"{
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Sid": "CustomAdmin",
                        "Effect": "Allow",
                        "Principal": { "AWS": ["${keyAdmins}"] },
                        "Action": ["kms:*"],
                        "Resource": "*"
                    }]
                }"#,
            )
            .unwrap(),
        );
        spec.removal_policy = RemovalPolicy::Destroy;
        let key = provision_key(&ctx, &spec).unwrap();
        let ProvisionedKey::Created {
            policy,
            removal_policy,
            ..
        } = &key
        else {
            panic!("expected a created key");
        };
        // custom base (1) + user variant (1)
        assert_eq!(policy.statement.len(), 2);
        assert_eq!(policy.statement[0].sid.as_deref(), Some("CustomAdmin"));
        assert_eq!(*removal_policy, RemovalPolicy::Destroy);
    }

    #[test]
    fn test_alias_materializes_alongside_key() {
        let ctx = test_context();
        let mut spec = ResourceKeySpec::new("staging-key", "d");
        spec.alias = Some("alias/dev-staging".to_string());
        let resources = provision_key(&ctx, &spec).unwrap().into_resources();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind(), "key");
        assert_eq!(resources[1].kind(), "key-alias");
        assert_eq!(resources[1].id(), "staging-key-alias");
    }
}
