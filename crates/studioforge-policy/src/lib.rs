// studioforge-policy - Policy documents and template hydration
//
// This crate contains the PURE policy logic: document model, typed
// template hydration over a finite placeholder set, and key-policy
// variant selection. No I/O, no provider calls - provisioners in
// studioforge-synth consume this to build submittable documents.

pub mod builtin;
pub mod document;
pub mod select;
pub mod template;

pub use document::{Effect, PolicyDocument, PolicyStatement, StringOrList, POLICY_VERSION};
pub use select::{select_key_policy_variant, KeyPolicyVariant};
pub use template::{HydrationContext, HydrationError, Placeholder, PolicyTemplate};
