//! Gate rejections and their HTTP mapping.
//!
//! Every token failure maps to the same bare 401: the variants exist for the
//! log line, never for the client.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use hiregate_auth::{TokenError, UnauthenticatedReason};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("no bearer token presented")]
    MissingCredentials,

    #[error("malformed authorization header: {0}")]
    MalformedRequest(&'static str),

    #[error("invalid token: {0}")]
    InvalidToken(TokenError),

    #[error("expired token: {0}")]
    ExpiredToken(TokenError),

    #[error("insufficient role: {0}")]
    InsufficientRole(String),

    #[error("policy lookup failure: {0}")]
    PolicyLookupFailure(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("no upstream serves '{0}'")]
    NoUpstream(String),

    #[error("ambiguous request path: {0}")]
    UnsafePath(&'static str),

    #[error("request body could not be read: {0}")]
    UnreadableBody(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::MissingCredentials
            | GateError::MalformedRequest(_)
            | GateError::InvalidToken(_)
            | GateError::ExpiredToken(_) => StatusCode::UNAUTHORIZED,
            GateError::InsufficientRole(_) => StatusCode::FORBIDDEN,
            GateError::PolicyLookupFailure(_) | GateError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GateError::NoUpstream(_) => StatusCode::NOT_FOUND,
            GateError::UnsafePath(_) | GateError::UnreadableBody(_) => StatusCode::BAD_REQUEST,
            GateError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GateError::MissingCredentials => "missing_credentials",
            GateError::MalformedRequest(_) => "malformed_request",
            GateError::InvalidToken(_) => "invalid_token",
            GateError::ExpiredToken(_) => "expired_token",
            GateError::InsufficientRole(_) => "insufficient_role",
            GateError::PolicyLookupFailure(_) => "policy_lookup_failure",
            GateError::Internal(_) => "internal",
            GateError::NoUpstream(_) => "no_upstream",
            GateError::UnsafePath(_) => "unsafe_path",
            GateError::UnreadableBody(_) => "unreadable_body",
            GateError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }

    /// Emit the single log line that accompanies a rejection.
    pub fn log_rejection(&self, method: &Method, path: &str) {
        let status = self.status().as_u16();
        if self.status().is_server_error() {
            error!(status, %method, path, kind = self.kind(), reason = %self, "request rejected");
        } else {
            warn!(status, %method, path, kind = self.kind(), reason = %self, "request rejected");
        }
    }
}

impl From<UnauthenticatedReason> for GateError {
    fn from(reason: UnauthenticatedReason) -> Self {
        match reason {
            UnauthenticatedReason::MissingToken => GateError::MissingCredentials,
            UnauthenticatedReason::Token(e) if e.is_expired() => GateError::ExpiredToken(e),
            UnauthenticatedReason::Token(e) => GateError::InvalidToken(e),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}
