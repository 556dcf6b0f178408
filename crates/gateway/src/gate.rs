//! The per-request admission pipeline.
//!
//! `Received -> Classifying -> (PublicPass | ExtractingToken -> ValidatingToken
//! -> Deciding) -> (Forwarding | Rejecting)`. The pipeline reads the inbound
//! request and, when it is admitted, builds a *new* outbound request; the
//! inbound headers are never edited in place.

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, Method, Request};
use tracing::debug;

use hiregate_auth::{Authorizer, Decision, Identity};

use crate::context::{IdentityContext, USER_ID_HEADER, USER_ROLES_HEADER};
use crate::errors::GateError;

/// An admitted request's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Passage {
    Public,
    Authenticated(Identity),
}

/// Refuse paths whose meaning changes once a URL parser or an upstream
/// normalizes them.
///
/// The decision and the upstream must see the same path, so `.`/`..`
/// segments (raw or `%2e`-encoded), encoded separators and backslashes are
/// rejected instead of resolved.
pub fn ensure_plain_path(path: &str) -> Result<(), GateError> {
    if path.contains('\\') {
        return Err(GateError::UnsafePath("backslash in path"));
    }

    for segment in path.split('/') {
        let lowered = segment.to_ascii_lowercase();
        if lowered.contains("%2f") || lowered.contains("%5c") {
            return Err(GateError::UnsafePath("encoded path separator"));
        }
        let decoded = lowered.replace("%2e", ".");
        if decoded == "." || decoded == ".." {
            return Err(GateError::UnsafePath("dot segment"));
        }
    }

    Ok(())
}

/// Classify a request and, for protected routes, verify its bearer token.
pub fn evaluate(
    authz: &Authorizer,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> Result<Passage, GateError> {
    ensure_plain_path(path)?;

    if let Some((public, protected)) = authz.policy().contradiction(method, path) {
        return Err(GateError::PolicyLookupFailure(format!(
            "'{public}' and '{protected}' both claim the request"
        )));
    }

    let token = match extract_bearer(headers) {
        Ok(token) => token,
        // A broken header only matters once the route turns out to be protected.
        Err(_) if authz.is_public(method, path) => return Ok(Passage::Public),
        Err(e) => return Err(e),
    };

    match authz.decide(method, path, token) {
        Decision::Public => Ok(Passage::Public),
        Decision::Authorized(identity) => Ok(Passage::Authenticated(identity)),
        Decision::Unauthenticated(reason) => Err(reason.into()),
        Decision::Forbidden(reason) => Err(GateError::InsufficientRole(reason)),
    }
}

/// Run the whole pipeline: evaluate `req`, then derive the request to forward.
pub fn admit(authz: &Authorizer, req: Request<Body>) -> Result<Request<Body>, GateError> {
    let passage = evaluate(authz, req.method(), req.uri().path(), req.headers())?;
    outbound(req, passage)
}

/// Build the outbound request from the inbound one.
///
/// Client-supplied identity headers are dropped on every route; on protected
/// routes they are replaced with the verified values.
pub fn outbound(req: Request<Body>, passage: Passage) -> Result<Request<Body>, GateError> {
    let (parts, body) = req.into_parts();

    let mut headers = parts.headers.clone();
    headers.remove(&USER_ID_HEADER);
    headers.remove(&USER_ROLES_HEADER);

    let mut extensions = parts.extensions.clone();

    if let Passage::Authenticated(identity) = passage {
        let subject = HeaderValue::from_str(identity.subject().as_str())
            .map_err(|e| GateError::Internal(format!("subject is not a valid header value: {e}")))?;
        let roles = HeaderValue::from_str(&identity.roles_header())
            .map_err(|e| GateError::Internal(format!("roles are not a valid header value: {e}")))?;

        debug!(subject = %identity.subject(), roles = %identity.roles_header(), "identity attached");
        headers.insert(USER_ID_HEADER, subject);
        headers.insert(USER_ROLES_HEADER, roles);
        extensions.insert(IdentityContext::new(identity));
    }

    let mut forwarded = Request::builder()
        .method(parts.method.clone())
        .uri(parts.uri.clone())
        .version(parts.version)
        .body(body)
        .map_err(|e| GateError::Internal(e.to_string()))?;
    *forwarded.headers_mut() = headers;
    *forwarded.extensions_mut() = extensions;

    Ok(forwarded)
}

/// `Ok(None)`: no header. `Err`: a header that is not `Bearer <token>`.
fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, GateError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header
        .to_str()
        .map_err(|_| GateError::MalformedRequest("authorization header is not visible ASCII"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(GateError::MalformedRequest("missing 'Bearer ' prefix"))?
        .trim();

    if token.is_empty() {
        return Err(GateError::MalformedRequest("empty bearer token"));
    }

    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use hiregate_auth::{RoutePolicy, SigningKey, TokenCodec};

    const SECRET: &[u8] = b"gate-unit-test-secret-0123456789";

    fn codec() -> TokenCodec {
        TokenCodec::new(SigningKey::from_bytes(SECRET).unwrap())
    }

    fn authorizer() -> Authorizer {
        Authorizer::new(
            Arc::new(RoutePolicy::hiring_platform().unwrap()),
            Arc::new(codec()),
        )
    }

    fn request(method: Method, path: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(USER_ID_HEADER, "spoofed")
            .header(USER_ROLES_HEADER, "RECRUITER");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn bearer(roles: &[&str]) -> String {
        let token = codec().encode("user-7", roles, Duration::hours(1)).unwrap();
        format!("Bearer {token}")
    }

    #[test]
    fn public_route_passes_and_drops_spoofed_identity() {
        let out = admit(&authorizer(), request(Method::GET, "/posts/all", None)).unwrap();
        assert!(out.headers().get(&USER_ID_HEADER).is_none());
        assert!(out.headers().get(&USER_ROLES_HEADER).is_none());
        assert!(out.extensions().get::<IdentityContext>().is_none());
    }

    #[test]
    fn public_route_ignores_malformed_header() {
        let req = request(Method::GET, "/posts/9", Some("Basic dXNlcjpwYXNz"));
        assert!(admit(&authorizer(), req).is_ok());
    }

    #[test]
    fn protected_route_requires_bearer_shape() {
        for auth in ["Basic dXNlcjpwYXNz", "bearer abc", "Bearer ", "Token abc"] {
            let err = admit(&authorizer(), request(Method::POST, "/posts/add", Some(auth))).unwrap_err();
            assert!(matches!(err, GateError::MalformedRequest(_)), "{auth}: {err:?}");
        }

        let err = admit(&authorizer(), request(Method::POST, "/posts/add", None)).unwrap_err();
        assert!(matches!(err, GateError::MissingCredentials));
    }

    #[test]
    fn verified_identity_replaces_spoofed_headers() {
        let auth = bearer(&["ROLE_RECRUITER", "ROLE_JOB_SEEKER"]);
        let out = admit(&authorizer(), request(Method::POST, "/posts/add", Some(&auth))).unwrap();

        assert_eq!(out.headers()[&USER_ID_HEADER], "user-7");
        assert_eq!(out.headers()[&USER_ROLES_HEADER], "RECRUITER,JOB_SEEKER");
        assert_eq!(out.headers().get_all(&USER_ID_HEADER).iter().count(), 1);
        assert_eq!(out.headers()[AUTHORIZATION], auth.as_str());

        let ctx = out.extensions().get::<IdentityContext>().unwrap();
        assert_eq!(ctx.subject().as_str(), "user-7");
    }

    #[test]
    fn roleless_identity_forwards_empty_roles_header() {
        let auth = bearer(&[]);
        let out = admit(&authorizer(), request(Method::GET, "/candidate/profile/5", Some(&auth))).unwrap();
        assert_eq!(out.headers()[&USER_ROLES_HEADER], "");
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let auth = bearer(&["JOB_SEEKER"]);
        let err = admit(&authorizer(), request(Method::POST, "/posts/add", Some(&auth))).unwrap_err();
        assert!(matches!(err, GateError::InsufficientRole(_)));
    }

    #[test]
    fn expired_and_forged_tokens_are_rejected() {
        let expired = codec().encode("user-7", &["RECRUITER"], Duration::seconds(-1)).unwrap();
        let err = admit(
            &authorizer(),
            request(Method::POST, "/posts/add", Some(&format!("Bearer {expired}"))),
        )
        .unwrap_err();
        assert!(matches!(err, GateError::ExpiredToken(_)));

        let forged = TokenCodec::new(SigningKey::from_bytes(b"another-secret-another-secret-!!").unwrap())
            .encode("user-7", &["RECRUITER"], Duration::hours(1))
            .unwrap();
        let err = admit(
            &authorizer(),
            request(Method::POST, "/posts/add", Some(&format!("Bearer {forged}"))),
        )
        .unwrap_err();
        assert!(matches!(err, GateError::InvalidToken(_)));
    }

    #[test]
    fn contradictory_policy_is_an_internal_failure() {
        let policy = RoutePolicy::builder()
            .public(Method::GET, "/posts/{id}")
            .authenticated(Method::GET, "/posts/mine")
            .build()
            .unwrap();
        let authz = Authorizer::new(Arc::new(policy), Arc::new(codec()));

        let err = admit(&authz, request(Method::GET, "/posts/mine", None)).unwrap_err();
        assert!(matches!(err, GateError::PolicyLookupFailure(_)));
        assert!(admit(&authz, request(Method::GET, "/posts/1", None)).is_ok());
    }

    #[test]
    fn traversal_paths_are_refused_before_any_decision() {
        for path in [
            "/posts/search/x/../../../candidate/profile/42",
            "/posts/search/x/%2e%2e/%2E%2E/candidate/profile/42",
            "/posts/search/x/.%2e/candidate",
            "/posts/search/./x",
            "/posts/search/x%2f..%2fcandidate",
            "/posts/search/x%5C..",
        ] {
            let err = admit(&authorizer(), request(Method::GET, path, None)).unwrap_err();
            assert!(matches!(err, GateError::UnsafePath(_)), "{path}: {err:?}");
        }
    }

    #[test]
    fn dots_inside_a_segment_are_plain_text() {
        for path in ["/posts/search/v1.2", "/posts/search/...", "/posts/search/.hidden", "/posts/search/%2e%2e%2e"] {
            assert!(ensure_plain_path(path).is_ok(), "{path}");
        }
        assert!(admit(&authorizer(), request(Method::GET, "/posts/search/rust..go", None)).is_ok());
    }

    #[test]
    fn outbound_keeps_method_uri_and_other_headers() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/posts/search/rust?page=2")
            .header("x-trace", "abc")
            .body(Body::empty())
            .unwrap();
        let out = outbound(req, Passage::Public).unwrap();

        assert_eq!(out.method(), Method::GET);
        assert_eq!(out.uri(), "/posts/search/rust?page=2");
        assert_eq!(out.headers()["x-trace"], "abc");
    }
}
