use axum::http::HeaderName;

use hiregate_auth::{Identity, Role};
use hiregate_core::Subject;

/// Carries the verified subject to downstream services.
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Carries the comma-joined, normalized role list to downstream services.
pub const USER_ROLES_HEADER: HeaderName = HeaderName::from_static("x-user-roles");

/// Verified identity attached to an admitted request.
///
/// Only the gate creates this; it is immutable and present on every request
/// that passed a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    identity: Identity,
}

impl IdentityContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn subject(&self) -> &Subject {
        self.identity.subject()
    }

    pub fn roles(&self) -> &[Role] {
        self.identity.roles()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}
