//! Storage bucket provisioning.
//!
//! Buckets start from the insecure-transport denial policy and
//! accumulate principal grants before materializing. A bucket may also
//! publish its name to a parameter so out-of-band tooling can find it
//! without knowing synthesis internals.

use serde_json::json;

use studioforge_policy::{builtin, HydrationContext, Placeholder, PolicyDocument, PolicyStatement};

use crate::error::Result;
use crate::resource::{RemovalPolicy, Resource};

const READ_ACTIONS: &[&str] = &["s3:GetObject*", "s3:GetBucket*", "s3:List*"];

const WRITE_ACTIONS: &[&str] = &[
    "s3:DeleteObject*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
    "s3:Abort*",
];

#[derive(Debug, Clone)]
pub struct BucketSpec {
    pub logical_id: String,
    pub bucket_name: String,
    /// Logical id of the encryption key, when one was created.
    pub key_ref: Option<String>,
    pub versioned: bool,
    /// Parameter path to publish the bucket name under.
    pub parameter_name: Option<String>,
}

impl BucketSpec {
    pub fn new(logical_id: impl Into<String>, bucket_name: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            bucket_name: bucket_name.into(),
            key_ref: None,
            versioned: true,
            parameter_name: None,
        }
    }
}

#[derive(Debug)]
pub struct ProvisionedBucket {
    pub bucket_ref: String,
    pub bucket_name: String,
    pub arn: String,
    spec: BucketSpec,
    policy: PolicyDocument,
}

impl ProvisionedBucket {
    pub fn grant_read(&mut self, principal_arn: &str) {
        self.grant(READ_ACTIONS, principal_arn);
    }

    pub fn grant_write(&mut self, principal_arn: &str) {
        self.grant(WRITE_ACTIONS, principal_arn);
    }

    pub fn grant_read_write(&mut self, principal_arn: &str) {
        self.grant_read(principal_arn);
        self.grant_write(principal_arn);
    }

    fn grant(&mut self, actions: &[&str], principal_arn: &str) {
        let objects = format!("{}/*", self.arn);
        self.policy.append([PolicyStatement::allow(
            actions,
            &[self.arn.as_str(), objects.as_str()],
        )
        .with_principal(json!({ "AWS": principal_arn }))]);
    }

    pub fn into_resources(self) -> Vec<Resource> {
        let mut resources = vec![Resource::Bucket {
            id: self.spec.logical_id.clone(),
            bucket_name: self.bucket_name.clone(),
            versioned: self.spec.versioned,
            enforce_ssl: true,
            block_public_access: true,
            removal_policy: RemovalPolicy::Retain,
            encryption_key_ref: self.spec.key_ref.clone(),
            policy: Some(self.policy),
        }];
        if let Some(parameter_name) = &self.spec.parameter_name {
            resources.push(Resource::Parameter {
                id: format!("{}-param", self.spec.logical_id),
                parameter_name: parameter_name.clone(),
                string_value: self.bucket_name,
            });
        }
        resources
    }
}

pub fn provision_bucket(spec: &BucketSpec) -> Result<ProvisionedBucket> {
    let arn = format!("arn:aws:s3:::{}", spec.bucket_name);
    let hydration = HydrationContext::new().scalar(Placeholder::BucketArn, &arn);
    let policy = builtin::default_bucket_policy().hydrate_document(&hydration)?;
    Ok(ProvisionedBucket {
        bucket_ref: spec.logical_id.clone(),
        bucket_name: spec.bucket_name.clone(),
        arn,
        spec: spec.clone(),
        policy,
    })
}
