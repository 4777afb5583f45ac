//! Built-in policy templates, embedded at compile time.
//!
//! These are the default documents provisioners fall back to when no
//! explicit policy is supplied. Each is parsed once; validity is pinned
//! by the parse test below.

use once_cell::sync::Lazy;

use crate::select::KeyPolicyVariant;
use crate::template::PolicyTemplate;

fn parse(name: &str, src: &str) -> PolicyTemplate {
    PolicyTemplate::parse(src)
        .unwrap_or_else(|e| panic!("embedded policy template '{name}' is invalid: {e}"))
}

static DEFAULT_KEY_POLICY: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "defaultKeyPolicy",
        include_str!("../policies/kms/default_key_policy.json"),
    )
});

static DEFAULT_KEY_USER: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "defaultKeyUser",
        include_str!("../policies/kms/default_key_user.json"),
    )
});

static DEFAULT_KEY_SERVICE: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "defaultKeyService",
        include_str!("../policies/kms/default_key_service.json"),
    )
});

static DEFAULT_KEY_SERVICE_USER: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "defaultKeyServiceUser",
        include_str!("../policies/kms/default_key_service_user.json"),
    )
});

static FLOW_LOGS_POLICY: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "flowLogsPolicy",
        include_str!("../policies/iam/flow_logs_policy.json"),
    )
});

static USER_EXECUTION_POLICY: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "userExecutionPolicy",
        include_str!("../policies/iam/user_execution_policy.json"),
    )
});

static SERVICE_EXECUTION_POLICY: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "userExecutionPolicySagemaker",
        include_str!("../policies/iam/user_execution_policy_sagemaker.json"),
    )
});

static BATCH_EXECUTION_POLICY: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "batchEc2Policy",
        include_str!("../policies/iam/batch_ec2_policy.json"),
    )
});

static ECR_READ_POLICY: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "smstudioEcrPolicy",
        include_str!("../policies/iam/smstudio_ecr_policy.json"),
    )
});

static DEFAULT_BUCKET_POLICY: Lazy<PolicyTemplate> = Lazy::new(|| {
    parse(
        "defaultBucketPolicy",
        include_str!("../policies/bucket/default_bucket_policy.json"),
    )
});

/// Base policy applied to every provisioned encryption key.
pub fn default_key_policy() -> &'static PolicyTemplate {
    &DEFAULT_KEY_POLICY
}

/// Statement set for the selected key-policy variant. These are bare
/// statement arrays, appended to the base policy's statements.
pub fn key_policy_variant(variant: KeyPolicyVariant) -> &'static PolicyTemplate {
    match variant {
        KeyPolicyVariant::User => &DEFAULT_KEY_USER,
        KeyPolicyVariant::Service => &DEFAULT_KEY_SERVICE,
        KeyPolicyVariant::ServiceUser => &DEFAULT_KEY_SERVICE_USER,
    }
}

/// Least-privilege policy for the network flow-log delivery role.
pub fn flow_logs_policy() -> &'static PolicyTemplate {
    &FLOW_LOGS_POLICY
}

/// General execution policy for the default notebook execution role.
pub fn user_execution_policy() -> &'static PolicyTemplate {
    &USER_EXECUTION_POLICY
}

/// Service-specific execution policy. The allowed-instance-types denial
/// statement attaches to this document when configured.
pub fn service_execution_policy() -> &'static PolicyTemplate {
    &SERVICE_EXECUTION_POLICY
}

/// Batch-compute execution policy.
pub fn batch_execution_policy() -> &'static PolicyTemplate {
    &BATCH_EXECUTION_POLICY
}

/// Container-registry read policy for pulling kernel images.
pub fn ecr_read_policy() -> &'static PolicyTemplate {
    &ECR_READ_POLICY
}

/// Base resource policy applied to every provisioned bucket.
pub fn default_bucket_policy() -> &'static PolicyTemplate {
    &DEFAULT_BUCKET_POLICY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{HydrationContext, Placeholder};

    #[test]
    fn test_all_builtin_templates_parse() {
        // forcing every Lazy catches malformed embedded JSON
        let _ = default_key_policy();
        let _ = key_policy_variant(KeyPolicyVariant::User);
        let _ = key_policy_variant(KeyPolicyVariant::Service);
        let _ = key_policy_variant(KeyPolicyVariant::ServiceUser);
        let _ = flow_logs_policy();
        let _ = user_execution_policy();
        let _ = service_execution_policy();
        let _ = batch_execution_policy();
        let _ = ecr_read_policy();
        let _ = default_bucket_policy();
    }

    #[test]
    fn test_variant_statement_counts() {
        let ctx = HydrationContext::new()
            .scalar(Placeholder::RoleArn, "arn:aws:iam::111122223333:root")
            .list(Placeholder::Service, ["sagemaker.amazonaws.com"]);
        assert_eq!(
            key_policy_variant(KeyPolicyVariant::User)
                .hydrate_statements(&ctx)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            key_policy_variant(KeyPolicyVariant::Service)
                .hydrate_statements(&ctx)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            key_policy_variant(KeyPolicyVariant::ServiceUser)
                .hydrate_statements(&ctx)
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn test_key_policy_appends_variant_statements() {
        let ctx = HydrationContext::new()
            .scalar(Placeholder::AccountId, "111122223333")
            .scalar(Placeholder::Region, "us-east-1")
            .scalar(Placeholder::RoleArn, "arn:aws:iam::111122223333:root")
            .scalar(Placeholder::RoleName, "deploy-pipeline-role")
            .list(Placeholder::KeyAdmins, ["arn:aws:iam::111122223333:root"]);
        let merged = default_key_policy()
            .with_appended_statements(key_policy_variant(KeyPolicyVariant::User));
        let doc = merged.hydrate_document(&ctx).unwrap();
        // base statements are retained, variant statements follow
        assert_eq!(doc.statement.len(), 3);
        assert_eq!(doc.statement[0].sid.as_deref(), Some("KeyAdministration"));
        assert_eq!(doc.statement[2].sid.as_deref(), Some("KeyUse"));
    }
}
