//! Serde model for the policy documents handed to the provisioning engine.
//!
//! The shapes mirror the identity-policy JSON the provider accepts:
//! PascalCase keys, single-or-list action/resource fields, free-form
//! principal and condition blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed schema version for all emitted policy documents.
pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One or many strings. Provider policy JSON allows both shapes for
/// action and resource fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            StringOrList::One(s) => std::slice::from_ref(s).iter().map(String::as_str),
            StringOrList::Many(v) => v.as_slice().iter().map(String::as_str),
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.iter().any(|s| s == needle)
    }

    pub fn len(&self) -> usize {
        match self {
            StringOrList::One(_) => 1,
            StringOrList::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for StringOrList {
    fn from(s: &str) -> Self {
        StringOrList::One(s.to_string())
    }
}

impl From<Vec<String>> for StringOrList {
    fn from(v: Vec<String>) -> Self {
        StringOrList::Many(v)
    }
}

impl From<&[&str]> for StringOrList {
    fn from(v: &[&str]) -> Self {
        StringOrList::Many(v.iter().map(|s| s.to_string()).collect())
    }
}

/// A single policy statement: effect, actions, resources, plus optional
/// principal and condition blocks kept as raw JSON since their shape
/// varies per statement kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    pub action: StringOrList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<StringOrList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

impl PolicyStatement {
    /// An allow statement over actions and resources, no principal.
    pub fn allow(actions: &[&str], resources: &[&str]) -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            principal: None,
            action: actions.into(),
            resource: Some(resources.into()),
            condition: None,
        }
    }

    /// A deny statement over actions and resources, no principal.
    pub fn deny(actions: &[&str], resources: &[&str]) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(actions, resources)
        }
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }
}

/// An ordered statement set with the fixed schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: Vec::new(),
        }
    }

    pub fn with_statements(statements: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: statements,
        }
    }

    /// Append statements to the existing set. Never replaces.
    pub fn append(&mut self, statements: impl IntoIterator<Item = PolicyStatement>) {
        self.statement.extend(statements);
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::new()
    }
}
