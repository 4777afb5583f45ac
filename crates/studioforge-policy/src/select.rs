//! Key-policy variant selection.
//!
//! Exactly one variant statement set is chosen from the admin and
//! service principal lists; the caller appends it to the base key
//! policy. Selection is a pure function of (adminsPresent,
//! servicesPresent).

/// The three mutually exclusive key-policy statement variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicyVariant {
    /// Principal access for identity users only.
    User,
    /// Service-principal access, no explicit admins.
    Service,
    /// Combined service and user access.
    ServiceUser,
}

/// Pick the variant for the given admin and service principal lists.
///
/// A services list containing only empty strings counts as empty - some
/// configuration paths produce a degenerate `[""]` representation that
/// must not select the service variants.
pub fn select_key_policy_variant(admins: &[String], services: &[String]) -> KeyPolicyVariant {
    let has_services = services.iter().any(|s| !s.is_empty());
    match (!admins.is_empty(), has_services) {
        (true, true) => KeyPolicyVariant::ServiceUser,
        (false, true) => KeyPolicyVariant::Service,
        _ => KeyPolicyVariant::User,
    }
}
