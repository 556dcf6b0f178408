use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Conventional prefix some issuers put in front of role names.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Role identifier used for route authorization.
///
/// Construction normalizes the name: a single leading [`ROLE_PREFIX`] is
/// stripped, so `"ROLE_RECRUITER"` and `"RECRUITER"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        let name = match name.into() {
            Cow::Borrowed(s) => Cow::Borrowed(s.strip_prefix(ROLE_PREFIX).unwrap_or(s)),
            Cow::Owned(s) => match s.strip_prefix(ROLE_PREFIX) {
                Some(stripped) => Cow::Owned(stripped.to_string()),
                None => Cow::Owned(s),
            },
        };
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.0.into_owned()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
