//! Error types for the synthesis crate.
//!
//! Every variant is a definition-time authoring error: no retry makes
//! sense, and each message names the offending field, token, or tag so
//! the author can fix the declarative input.

use studioforge_policy::HydrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    /// A required top-level value is absent after checking config and
    /// environment fallback.
    #[error("required configuration value '{field}' is missing")]
    ConfigurationMissing { field: String },

    /// A placeholder token lacked a supplied value. The message names
    /// every unresolved token.
    #[error("policy template has unresolved tokens: {}", tokens.join(", "))]
    TemplateResolutionGap { tokens: Vec<String> },

    /// An enumerated field received a value outside the fixed option
    /// set understood by the target provider.
    #[error("invalid value '{value}' for {field}; supported: {allowed}")]
    InvalidEnumSelection {
        field: String,
        value: String,
        allowed: String,
    },

    /// A domain references a custom-image tag that was never declared
    /// in the image map.
    #[error("domain '{domain}' references custom image tag '{tag}' that was never declared")]
    ReferenceNotFound { domain: String, tag: String },

    /// No notebook image account is registered for the region.
    #[error("no notebook image account is registered for region '{region}'")]
    UnsupportedRegion { region: String },

    /// Two user names normalize to the same profile identifier.
    #[error("user names '{first}' and '{second}' collide after normalization to '{normalized}'")]
    DuplicateUser {
        first: String,
        second: String,
        normalized: String,
    },

    /// An imported network id could not be resolved.
    #[error("existing network '{vpc_id}' could not be resolved")]
    NetworkNotFound { vpc_id: String },

    /// The declared references form a cycle; no creation order exists.
    #[error("resource dependency cycle involving '{id}'")]
    DependencyCycle { id: String },

    /// An external policy file could not be read.
    #[error("failed to read policy file '{path}': {source}")]
    PolicyFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A policy document failed to parse or serialize.
    #[error("invalid policy document: {0}")]
    InvalidPolicy(#[from] serde_json::Error),
}

impl SynthError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            field: field.into(),
        }
    }

    pub fn invalid_enum(
        field: impl Into<String>,
        value: impl Into<String>,
        allowed: impl Into<String>,
    ) -> Self {
        Self::InvalidEnumSelection {
            field: field.into(),
            value: value.into(),
            allowed: allowed.into(),
        }
    }

    pub fn reference_not_found(domain: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::ReferenceNotFound {
            domain: domain.into(),
            tag: tag.into(),
        }
    }
}

impl From<HydrationError> for SynthError {
    fn from(err: HydrationError) -> Self {
        match err {
            HydrationError::MissingTokens { tokens } => Self::TemplateResolutionGap { tokens },
            HydrationError::InvalidJson(err) => Self::InvalidPolicy(err),
        }
    }
}

/// Result type alias for SynthError
pub type Result<T> = std::result::Result<T, SynthError>;
