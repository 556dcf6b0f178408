use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hiregate_core::Subject;

/// Verified token claims.
///
/// Only ever produced by [`TokenCodec::decode`](crate::TokenCodec::decode)
/// after the signature and expiry checks passed. `roles` holds the raw
/// strings from the token; normalization happens when an
/// [`Identity`](crate::Identity) is derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: Subject,
    pub roles: Vec<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Payload as it travels inside the signed token.
///
/// Issuer versions disagree on the role claim key: newer ones write
/// `roles`, older ones `authorities`. Both are accepted, `roles` first. When
/// neither is present the role list is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenPayload {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities: Option<Vec<RoleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub exp: i64,
}

impl TokenPayload {
    pub(crate) fn role_names(&mut self) -> Vec<String> {
        self.roles
            .take()
            .or_else(|| self.authorities.take())
            .unwrap_or_default()
            .into_iter()
            .map(RoleEntry::into_name)
            .collect()
    }
}

/// A role claim entry: either a bare name or a granted-authority object
/// (`{"authority": "ROLE_X"}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum RoleEntry {
    Name(String),
    Authority { authority: String },
}

impl RoleEntry {
    fn into_name(self) -> String {
        match self {
            RoleEntry::Name(name) => name,
            RoleEntry::Authority { authority } => authority,
        }
    }
}
