//! Execution-role provisioning.
//!
//! Each role resolves to exactly one policy variant before any document
//! is built: an external policy file supplied in config, or the built-in
//! default bundle. A configured-but-missing file logs a warning and
//! falls back to the bundle rather than failing the whole synthesis.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::warn;

use studioforge_policy::{
    builtin, Effect, HydrationContext, Placeholder, PolicyDocument, PolicyStatement,
    PolicyTemplate,
};

use crate::error::{Result, SynthError};
use crate::resource::Resource;
use crate::SynthContext;

/// Service principals allowed to assume notebook execution roles.
const TRUSTED_SERVICES: &[&str] = &[
    "sagemaker.amazonaws.com",
    "lambda.amazonaws.com",
    "codebuild.amazonaws.com",
    "osis-pipelines.amazonaws.com",
];

const S3_FULL_ACCESS_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3FullAccess";

#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub logical_id: String,
    pub role_name: String,
    /// Path to a policy document overriding the default bundle.
    pub execution_policy_path: Option<PathBuf>,
    /// Instance-type allow-list, enforced as a denial statement on the
    /// service policy.
    pub allowed_instance_types: Option<Vec<String>>,
}

impl RoleSpec {
    pub fn new(logical_id: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            role_name: role_name.into(),
            execution_policy_path: None,
            allowed_instance_types: None,
        }
    }
}

/// Which policy set a role carries. Resolved once per role, up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleVariant {
    /// A single custom policy loaded from the given file.
    ExternalPolicy { path: PathBuf },
    /// The built-in execution policies plus managed S3 access.
    DefaultBundle,
}

#[derive(Debug)]
pub struct ProvisionedRole {
    pub role_ref: String,
    pub role_name: String,
    pub arn: String,
    pub resources: Vec<Resource>,
}

impl ProvisionedRole {
    /// First managed policy in the bundle, for callers appending grants
    /// before the documents are materialized.
    pub fn primary_policy_mut(&mut self) -> Option<&mut PolicyDocument> {
        self.resources.iter_mut().find_map(|r| match r {
            Resource::ManagedPolicy { document, .. } => Some(document),
            _ => None,
        })
    }
}

fn resolve_variant(spec: &RoleSpec) -> RoleVariant {
    match &spec.execution_policy_path {
        Some(path) if path.is_file() => RoleVariant::ExternalPolicy { path: path.clone() },
        Some(path) => {
            warn!(
                role = %spec.role_name,
                path = %path.display(),
                "execution policy file not found, using default policy bundle"
            );
            RoleVariant::DefaultBundle
        }
        None => RoleVariant::DefaultBundle,
    }
}

fn trust_policy() -> PolicyDocument {
    let services: Vec<String> = TRUSTED_SERVICES.iter().map(|s| s.to_string()).collect();
    // No Resource field: trust policies scope by principal alone.
    PolicyDocument::with_statements(vec![PolicyStatement {
        sid: None,
        effect: Effect::Allow,
        principal: Some(json!({ "Service": services })),
        action: "sts:AssumeRole".into(),
        resource: None,
        condition: None,
    }])
}

/// Denial that pins notebook apps to the allowed instance types. The
/// configured list is used verbatim; authors wanting the `system`
/// pseudo type for built-in apps list it themselves.
fn allowed_instances_statement(allowed: &[String]) -> PolicyStatement {
    PolicyStatement::deny(&["sagemaker:CreateApp", "sagemaker:UpdateSpace"], &["*"]).with_condition(
        json!({
            "ForAllValues:StringNotLike": {
                "sagemaker:InstanceTypes": allowed
            }
        }),
    )
}

fn load_external_policy(path: &Path) -> Result<PolicyTemplate> {
    let content = std::fs::read_to_string(path).map_err(|source| SynthError::PolicyFileRead {
        path: path.display().to_string(),
        source,
    })?;
    Ok(PolicyTemplate::parse(&content)?)
}

pub fn provision_role(ctx: &SynthContext, spec: &RoleSpec) -> Result<ProvisionedRole> {
    let hydration = HydrationContext::new()
        .scalar(Placeholder::AccountId, &ctx.account_id)
        .scalar(Placeholder::Region, &ctx.region);

    let mut resources = vec![Resource::Role {
        id: spec.logical_id.clone(),
        role_name: spec.role_name.clone(),
        assume_role_policy: trust_policy(),
        managed_policy_arns: vec![S3_FULL_ACCESS_ARN.to_string()],
    }];

    let push_policy = |suffix: &str, document: PolicyDocument, resources: &mut Vec<Resource>| {
        let policy_name = format!("{}-{}", spec.role_name, suffix);
        resources.push(Resource::ManagedPolicy {
            id: format!("{}-{}", spec.logical_id, suffix),
            policy_name,
            document,
            role_refs: vec![spec.logical_id.clone()],
        });
    };

    match resolve_variant(spec) {
        RoleVariant::ExternalPolicy { path } => {
            let mut document = load_external_policy(&path)?.hydrate_document(&hydration)?;
            // with a single custom policy the denial attaches to it
            if let Some(allowed) = &spec.allowed_instance_types {
                document.append([allowed_instances_statement(allowed)]);
            }
            push_policy("policy", document, &mut resources);
        }
        RoleVariant::DefaultBundle => {
            let user = builtin::user_execution_policy().hydrate_document(&hydration)?;
            push_policy("policy", user, &mut resources);

            let mut service = builtin::service_execution_policy().hydrate_document(&hydration)?;
            if let Some(allowed) = &spec.allowed_instance_types {
                service.append([allowed_instances_statement(allowed)]);
            }
            push_policy("sagemaker-policy", service, &mut resources);

            let batch = builtin::batch_execution_policy().hydrate_document(&hydration)?;
            push_policy("batch-policy", batch, &mut resources);

            let ecr = builtin::ecr_read_policy().hydrate_document(&hydration)?;
            push_policy("ecr-smstudio-policy", ecr, &mut resources);
        }
    }

    Ok(ProvisionedRole {
        role_ref: spec.logical_id.clone(),
        role_name: spec.role_name.clone(),
        arn: ctx.role_arn(&spec.role_name),
        resources,
    })
}
