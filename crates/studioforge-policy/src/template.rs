//! Typed template hydration over a finite, enumerated placeholder set.
//!
//! Templates are immutable JSON documents containing `${token}`
//! placeholders. Hydration produces a new, fully-resolved copy and is
//! strict: any token left without a value fails with every missing token
//! named, since a resource policy containing a literal `${token}` string
//! is a silent security failure.
//!
//! Two token kinds exist:
//! - scalar tokens substitute anywhere inside string values
//! - list tokens (`keyAdmins`, `service`) expand in place; an exact-match
//!   occurrence splices into the surrounding array or replaces the field
//!   value, and an EMPTY list removes the containing field entirely so
//!   the output is always valid policy JSON

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;

use crate::document::{PolicyDocument, PolicyStatement};

/// The finite set of placeholder tokens templates may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    AccountId,
    Region,
    KeyAdmins,
    RoleArn,
    RoleName,
    Service,
    BucketArn,
}

impl Placeholder {
    pub const ALL: [Placeholder; 7] = [
        Placeholder::AccountId,
        Placeholder::Region,
        Placeholder::KeyAdmins,
        Placeholder::RoleArn,
        Placeholder::RoleName,
        Placeholder::Service,
        Placeholder::BucketArn,
    ];

    /// Bare token name as it appears between `${` and `}`.
    pub fn name(self) -> &'static str {
        match self {
            Placeholder::AccountId => "accountId",
            Placeholder::Region => "region",
            Placeholder::KeyAdmins => "keyAdmins",
            Placeholder::RoleArn => "roleArn",
            Placeholder::RoleName => "roleName",
            Placeholder::Service => "service",
            Placeholder::BucketArn => "bucketArn",
        }
    }

    /// Full token literal, e.g. `${accountId}`.
    pub fn token(self) -> &'static str {
        match self {
            Placeholder::AccountId => "${accountId}",
            Placeholder::Region => "${region}",
            Placeholder::KeyAdmins => "${keyAdmins}",
            Placeholder::RoleArn => "${roleArn}",
            Placeholder::RoleName => "${roleName}",
            Placeholder::Service => "${service}",
            Placeholder::BucketArn => "${bucketArn}",
        }
    }

    /// List-typed tokens expand to JSON arrays rather than scalar strings.
    pub fn is_list(self) -> bool {
        matches!(self, Placeholder::KeyAdmins | Placeholder::Service)
    }

    fn from_token(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.token() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenValue {
    Scalar(String),
    List(Vec<String>),
}

/// Token-to-value mapping for one hydration pass.
#[derive(Debug, Clone, Default)]
pub struct HydrationContext {
    values: BTreeMap<Placeholder, TokenValue>,
}

impl HydrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.values
            .insert(placeholder, TokenValue::Scalar(value.into()));
        self
    }

    pub fn list<I, S>(mut self, placeholder: Placeholder, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.insert(
            placeholder,
            TokenValue::List(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    fn get(&self, placeholder: Placeholder) -> Option<&TokenValue> {
        self.values.get(&placeholder)
    }
}

#[derive(Debug, Error)]
pub enum HydrationError {
    /// One or more tokens had no value supplied. Fatal at definition
    /// time; the message names every unresolved token.
    #[error("unresolved template tokens: {}", tokens.join(", "))]
    MissingTokens { tokens: Vec<String> },

    /// The template or the hydrated output is not valid policy JSON.
    #[error("invalid policy JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// An immutable policy template. Hydration never mutates the template,
/// so one template may be shared across invocations with different
/// runtime values.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTemplate {
    value: Value,
}

impl PolicyTemplate {
    pub fn parse(json: &str) -> Result<Self, HydrationError> {
        Ok(Self {
            value: serde_json::from_str(json)?,
        })
    }

    pub fn from_value(value: Value) -> Self {
        Self { value }
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Return a new template whose `Statement` array has the given
    /// statement-set template appended. The statement set must itself be
    /// a JSON array; the receiver's statements are never replaced.
    pub fn with_appended_statements(&self, statements: &PolicyTemplate) -> Self {
        let mut value = self.value.clone();
        let appended = match &statements.value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        match value
            .as_object_mut()
            .and_then(|doc| doc.get_mut("Statement"))
            .and_then(Value::as_array_mut)
        {
            Some(existing) => existing.extend(appended),
            None => {
                if let Some(doc) = value.as_object_mut() {
                    doc.insert("Statement".to_string(), Value::Array(appended));
                }
            }
        }
        Self { value }
    }

    /// Hydrate into a raw JSON value. Strict: fails if any token remains
    /// unresolved.
    pub fn hydrate_value(&self, ctx: &HydrationContext) -> Result<Value, HydrationError> {
        let mut missing = BTreeSet::new();
        let hydrated = hydrate_value(&self.value, ctx, &mut missing).unwrap_or(Value::Null);
        if !missing.is_empty() {
            return Err(HydrationError::MissingTokens {
                tokens: missing.into_iter().collect(),
            });
        }
        Ok(hydrated)
    }

    /// Hydrate a full policy document template.
    pub fn hydrate_document(&self, ctx: &HydrationContext) -> Result<PolicyDocument, HydrationError> {
        let value = self.hydrate_value(ctx)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Hydrate a statement-set template (a bare JSON array of statements).
    pub fn hydrate_statements(
        &self,
        ctx: &HydrationContext,
    ) -> Result<Vec<PolicyStatement>, HydrationError> {
        let value = self.hydrate_value(ctx)?;
        Ok(serde_json::from_value(value)?)
    }
}

fn hydrate_value(
    value: &Value,
    ctx: &HydrationContext,
    missing: &mut BTreeSet<String>,
) -> Option<Value> {
    match value {
        Value::String(s) => hydrate_string(s, ctx, missing),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            let mut spliced_list = false;
            for item in items {
                // An exact list token inside an array splices its items
                // in place rather than nesting an array.
                if let Value::String(s) = item {
                    if let Some(p) = Placeholder::from_token(s) {
                        if p.is_list() {
                            spliced_list = true;
                            match ctx.get(p) {
                                Some(TokenValue::List(vals)) => {
                                    out.extend(vals.iter().cloned().map(Value::String));
                                }
                                Some(TokenValue::Scalar(v)) => {
                                    out.push(Value::String(v.clone()));
                                }
                                None => {
                                    missing.insert(p.name().to_string());
                                }
                            }
                            continue;
                        }
                    }
                }
                if let Some(v) = hydrate_value(item, ctx, missing) {
                    out.push(v);
                }
            }
            // An array emptied by an empty list token removes the
            // containing field so no dangling empty principal remains.
            if out.is_empty() && spliced_list {
                None
            } else {
                Some(Value::Array(out))
            }
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if let Some(hydrated) = hydrate_value(v, ctx, missing) {
                    out.insert(k.clone(), hydrated);
                }
            }
            Some(Value::Object(out))
        }
        other => Some(other.clone()),
    }
}

fn hydrate_string(
    s: &str,
    ctx: &HydrationContext,
    missing: &mut BTreeSet<String>,
) -> Option<Value> {
    // Whole-string token: may expand to an array or remove the field.
    if let Some(p) = Placeholder::from_token(s) {
        return match ctx.get(p) {
            Some(TokenValue::Scalar(v)) => Some(Value::String(v.clone())),
            Some(TokenValue::List(vals)) => {
                if vals.is_empty() {
                    None
                } else {
                    Some(Value::Array(
                        vals.iter().cloned().map(Value::String).collect(),
                    ))
                }
            }
            None => {
                missing.insert(p.name().to_string());
                Some(Value::String(s.to_string()))
            }
        };
    }

    // Tokens embedded in larger strings substitute as substrings.
    let mut out = s.to_string();
    for p in Placeholder::ALL {
        if !out.contains(p.token()) {
            continue;
        }
        match ctx.get(p) {
            Some(TokenValue::Scalar(v)) => out = out.replace(p.token(), v),
            Some(TokenValue::List(vals)) => out = out.replace(p.token(), &vals.join(", ")),
            // left in place; picked up by the unresolved scan below
            None => {}
        }
    }
    scan_unresolved(&out, missing);
    Some(Value::String(out))
}

/// Record every `${name}` still present after substitution. Catches both
/// known tokens without values and tokens outside the enumerated set.
fn scan_unresolved(s: &str, missing: &mut BTreeSet<String>) {
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let tail = &rest[start + 2..];
        match tail.find('}') {
            Some(end) => {
                missing.insert(tail[..end].to_string());
                rest = &tail[end + 1..];
            }
            None => break,
        }
    }
}
