//! Signed identity tokens (HS256 JWT).
//!
//! The issuer and the gate share one symmetric key. The gate only ever
//! calls [`TokenCodec::decode`]; [`TokenCodec::encode`] exists so the issuer
//! contract can be exercised end to end.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use hiregate_core::Subject;

use crate::claims::{Claims, RoleEntry, TokenPayload};

/// Minimum HMAC key length: HS256 keys must be at least as long as the hash.
pub const MIN_KEY_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token uses an unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("token could not be encoded: {0}")]
    Encoding(String),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenError::UnsupportedAlgorithm
            }
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Symmetric key material shared with the token issuer.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.len() < MIN_KEY_LEN {
            return Err(TokenError::InvalidKey(format!(
                "key is {} bytes, at least {MIN_KEY_LEN} required",
                secret.len()
            )));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// Build a key from its base64 (standard alphabet) form, the way the
    /// issuer stores it in configuration.
    pub fn from_base64(secret: &str) -> Result<Self, TokenError> {
        let bytes = STANDARD
            .decode(secret.trim())
            .map_err(|e| TokenError::InvalidKey(format!("not base64: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl core::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct TokenCodec {
    key: SigningKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(key: SigningKey) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below with zero leeway against an explicit clock.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self { key, validation }
    }

    /// Verify and decode `token` against the current time.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_at(token, Utc::now())
    }

    /// Verify and decode `token` as of `now`.
    ///
    /// The signature is checked before any claim is trusted, so a token that
    /// is both forged and expired reports [`TokenError::BadSignature`].
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut payload =
            jsonwebtoken::decode::<TokenPayload>(token, &self.key.decoding, &self.validation)?.claims;

        let expires_at = DateTime::from_timestamp(payload.exp, 0)
            .ok_or_else(|| TokenError::Malformed("exp out of range".into()))?;
        if expires_at <= now {
            return Err(TokenError::Expired { expired_at: expires_at });
        }

        let issued_at = match payload.iat {
            Some(iat) => Some(
                DateTime::from_timestamp(iat, 0)
                    .ok_or_else(|| TokenError::Malformed("iat out of range".into()))?,
            ),
            None => None,
        };

        let roles = payload.role_names();
        let subject = Subject::new(std::mem::take(&mut payload.sub))
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        Ok(Claims {
            subject,
            roles,
            issued_at,
            expires_at,
        })
    }

    /// Issue a token for `subject` valid for `ttl` from now.
    pub fn encode<R: AsRef<str>>(
        &self,
        subject: &str,
        roles: &[R],
        ttl: Duration,
    ) -> Result<String, TokenError> {
        self.encode_at(subject, roles, ttl, Utc::now())
    }

    /// Issue a token as of `now`. A non-positive `ttl` yields a token that is
    /// already expired.
    pub fn encode_at<R: AsRef<str>>(
        &self,
        subject: &str,
        roles: &[R],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let subject = Subject::new(subject).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let payload = TokenPayload {
            sub: subject.into(),
            roles: Some(
                roles
                    .iter()
                    .map(|r| RoleEntry::Name(r.as_ref().to_string()))
                    .collect(),
            ),
            authorities: None,
            iat: Some(now.timestamp()),
            exp: (now + ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &payload, &self.key.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }
}
