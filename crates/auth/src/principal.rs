use hiregate_core::Subject;

use crate::{Claims, Role};

/// A verified identity: who the caller is and which roles they hold.
///
/// Roles are normalized and de-duplicated, keeping the order in which the
/// token listed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    subject: Subject,
    roles: Vec<Role>,
}

impl Identity {
    pub fn new(subject: Subject, roles: impl IntoIterator<Item = Role>) -> Self {
        let mut unique: Vec<Role> = Vec::new();
        for role in roles {
            if !role.is_empty() && !unique.contains(&role) {
                unique.push(role);
            }
        }
        Self {
            subject,
            roles: unique,
        }
    }

    pub fn from_claims(claims: Claims) -> Self {
        Self::new(claims.subject, claims.roles.into_iter().map(Role::new))
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Comma-joined role list as forwarded to downstream services
    /// (empty string when there are no roles).
    pub fn roles_header(&self) -> String {
        self.roles
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn subject(s: &str) -> Subject {
        Subject::new(s).unwrap()
    }

    #[test]
    fn roles_are_normalized_and_deduplicated() {
        let claims = Claims {
            subject: subject("alice"),
            roles: vec![
                "ROLE_RECRUITER".into(),
                "RECRUITER".into(),
                "ROLE_JOB_SEEKER".into(),
                "ROLE_".into(),
            ],
            issued_at: None,
            expires_at: Utc::now(),
        };

        let identity = Identity::from_claims(claims);
        assert_eq!(identity.subject().as_str(), "alice");
        assert_eq!(identity.roles_header(), "RECRUITER,JOB_SEEKER");
        assert!(identity.has_role(&Role::new("ROLE_JOB_SEEKER")));
    }

    #[test]
    fn no_roles_render_as_empty_header() {
        let identity = Identity::new(subject("bob"), Vec::new());
        assert_eq!(identity.roles_header(), "");
        assert!(identity.roles().is_empty());
    }
}
