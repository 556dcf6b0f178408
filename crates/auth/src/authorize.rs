use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::Method;
use thiserror::Error;
use tracing::debug;

use crate::{Claims, Identity, RoutePolicy, TokenCodec, TokenError};

/// Outcome of evaluating one request against the route policy.
///
/// Exactly one decision is produced per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No identity required; forward unchanged.
    Public,
    /// A verified identity satisfied the matched rule.
    Authorized(Identity),
    /// Protected route and no usable token.
    Unauthenticated(UnauthenticatedReason),
    /// Valid token, but no rule grants access to this method and path.
    Forbidden(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Public | Decision::Authorized(_))
    }
}

/// Why a protected route was not authenticated. Diagnostics only; callers
/// must not expose the distinction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    #[error("no bearer token presented")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),
}

pub const NO_MATCHING_RULE: &str = "no matching role/method/path";

/// Combines the route policy with a token codec.
///
/// Both are immutable after startup, so a single `Authorizer` is shared by
/// every request without locking.
#[derive(Debug, Clone)]
pub struct Authorizer {
    policy: Arc<RoutePolicy>,
    codec: Arc<TokenCodec>,
}

impl Authorizer {
    pub fn new(policy: Arc<RoutePolicy>, codec: Arc<TokenCodec>) -> Self {
        Self { policy, codec }
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.policy.is_public(method, path)
    }

    pub fn decide(&self, method: &Method, path: &str, token: Option<&str>) -> Decision {
        self.decide_at(method, path, token, Utc::now())
    }

    /// Evaluate a request as of `now`.
    ///
    /// Public routes short-circuit before the token is even looked at, so a
    /// broken token on a public route is ignored rather than rejected.
    pub fn decide_at(
        &self,
        method: &Method,
        path: &str,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Decision {
        if self.policy.is_public(method, path) {
            return Decision::Public;
        }

        let Some(token) = token else {
            return Decision::Unauthenticated(UnauthenticatedReason::MissingToken);
        };

        match self.codec.decode_at(token, now) {
            Ok(claims) => authorize(&self.policy, method, path, claims),
            Err(e) => Decision::Unauthenticated(e.into()),
        }
    }
}

/// Authorize verified `claims` for a protected route.
///
/// - No IO
/// - No panics
/// - Authenticated-any rules are consulted before role-restricted ones
pub fn authorize(policy: &RoutePolicy, method: &Method, path: &str, claims: Claims) -> Decision {
    let identity = Identity::from_claims(claims);

    if let Some(rule) = policy.match_authenticated(method, path) {
        debug!(subject = %identity.subject(), %rule, "authorized by authenticated rule");
        return Decision::Authorized(identity);
    }

    let granted = identity
        .roles()
        .iter()
        .find_map(|role| policy.match_role(role, method, path));

    match granted {
        Some(rule) => {
            debug!(subject = %identity.subject(), %rule, "authorized by role rule");
            Decision::Authorized(identity)
        }
        None => Decision::Forbidden(NO_MATCHING_RULE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, SigningKey};
    use chrono::Duration;

    const SECRET: &[u8] = b"an-hs256-secret-of-32-bytes-min!";

    fn authorizer() -> Authorizer {
        let codec = TokenCodec::new(SigningKey::from_bytes(SECRET).unwrap());
        Authorizer::new(
            Arc::new(RoutePolicy::hiring_platform().unwrap()),
            Arc::new(codec),
        )
    }

    fn token(roles: &[&str], ttl: Duration) -> String {
        TokenCodec::new(SigningKey::from_bytes(SECRET).unwrap())
            .encode("user-42", roles, ttl)
            .unwrap()
    }

    #[test]
    fn public_route_without_token() {
        let authz = authorizer();
        assert_eq!(authz.decide(&Method::GET, "/posts/all", None), Decision::Public);
        assert_eq!(
            authz.decide(&Method::GET, "/posts/all", Some("garbage")),
            Decision::Public
        );
    }

    #[test]
    fn options_passes_with_or_without_token() {
        let authz = authorizer();
        let t = token(&["JOB_SEEKER"], Duration::hours(1));
        for path in ["/posts/add", "/candidate/profile", "/not/in/the/table"] {
            assert_eq!(authz.decide(&Method::OPTIONS, path, None), Decision::Public);
            assert_eq!(authz.decide(&Method::OPTIONS, path, Some(&t)), Decision::Public);
        }
    }

    #[test]
    fn protected_route_without_token() {
        assert_eq!(
            authorizer().decide(&Method::POST, "/posts/add", None),
            Decision::Unauthenticated(UnauthenticatedReason::MissingToken)
        );
    }

    #[test]
    fn expired_token_is_unauthenticated() {
        let t = token(&["RECRUITER"], Duration::seconds(-5));
        let decision = authorizer().decide(&Method::POST, "/posts/add", Some(&t));
        assert!(matches!(
            decision,
            Decision::Unauthenticated(UnauthenticatedReason::Token(TokenError::Expired { .. }))
        ));
    }

    #[test]
    fn recruiter_may_post_jobs() {
        let t = token(&["ROLE_RECRUITER"], Duration::hours(1));
        let decision = authorizer().decide(&Method::POST, "/posts/add", Some(&t));

        let Decision::Authorized(identity) = decision else {
            panic!("expected Authorized, got {decision:?}");
        };
        assert_eq!(identity.subject().as_str(), "user-42");
        assert_eq!(identity.roles(), &[Role::new("RECRUITER")]);
    }

    #[test]
    fn job_seeker_may_not_post_jobs() {
        let t = token(&["JOB_SEEKER"], Duration::hours(1));
        assert_eq!(
            authorizer().decide(&Method::POST, "/posts/add", Some(&t)),
            Decision::Forbidden(NO_MATCHING_RULE.to_string())
        );
    }

    #[test]
    fn job_seeker_may_apply_and_edit_profile() {
        let authz = authorizer();
        let t = token(&["ROLE_JOB_SEEKER"], Duration::hours(1));
        assert!(authz.decide(&Method::POST, "/posts/apply/7", Some(&t)).is_allowed());
        assert!(authz.decide(&Method::POST, "/candidate/profile", Some(&t)).is_allowed());
    }

    #[test]
    fn any_identity_may_read_profiles() {
        let authz = authorizer();
        for roles in [vec!["RECRUITER"], vec!["JOB_SEEKER"], vec![]] {
            let t = token(&roles, Duration::hours(1));
            assert!(matches!(
                authz.decide(&Method::GET, "/candidate/profile/42", Some(&t)),
                Decision::Authorized(_)
            ));
        }
    }

    #[test]
    fn roleless_token_is_only_authorized_by_authenticated_rules() {
        let authz = authorizer();
        let t = token(&[], Duration::hours(1));
        assert!(authz.decide(&Method::GET, "/candidate/profile/1", Some(&t)).is_allowed());
        assert!(matches!(
            authz.decide(&Method::POST, "/posts/add", Some(&t)),
            Decision::Forbidden(_)
        ));
        assert!(matches!(
            authz.decide(&Method::POST, "/candidate/profile", Some(&t)),
            Decision::Forbidden(_)
        ));
    }

    #[test]
    fn unknown_route_with_valid_token_is_forbidden() {
        let t = token(&["RECRUITER", "JOB_SEEKER"], Duration::hours(1));
        assert!(matches!(
            authorizer().decide(&Method::DELETE, "/posts/3", Some(&t)),
            Decision::Forbidden(_)
        ));
    }

    #[test]
    fn authorize_is_pure_over_claims() {
        let policy = RoutePolicy::hiring_platform().unwrap();
        let claims = Claims {
            subject: hiregate_core::Subject::new("x").unwrap(),
            roles: vec!["ROLE_RECRUITER".into()],
            issued_at: None,
            expires_at: Utc::now() + Duration::hours(1),
        };
        assert!(authorize(&policy, &Method::POST, "/posts/add", claims.clone()).is_allowed());
        assert!(!authorize(&policy, &Method::POST, "/posts/apply/1", claims).is_allowed());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn method() -> impl Strategy<Value = Method> {
            prop_oneof![
                Just(Method::GET),
                Just(Method::POST),
                Just(Method::PUT),
                Just(Method::DELETE),
                Just(Method::PATCH),
            ]
        }

        fn path() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("/posts/add".to_string()),
                Just("/posts/all".to_string()),
                Just("/candidate/profile".to_string()),
                "/posts/apply/[0-9]{1,4}",
                "/candidate/profile/[0-9]{1,4}",
                "/[a-z]{1,6}/[a-z0-9]{1,6}",
            ]
        }

        fn roles() -> impl Strategy<Value = Vec<&'static str>> {
            proptest::sample::subsequence(
                vec!["RECRUITER", "ROLE_JOB_SEEKER", "ADMIN", "ROLE_RECRUITER"],
                0..3,
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

            /// Property: identical request + identical token = identical decision.
            #[test]
            fn decisions_are_idempotent(m in method(), p in path(), r in roles()) {
                let authz = authorizer();
                let t = token(&r, Duration::hours(1));
                let now = Utc::now();
                let first = authz.decide_at(&m, &p, Some(&t), now);
                let second = authz.decide_at(&m, &p, Some(&t), now);
                prop_assert_eq!(first, second);
            }

            /// Property: OPTIONS never yields 401/403 material.
            #[test]
            fn options_is_never_rejected(p in path(), with_token in any::<bool>()) {
                let t = token(&["RECRUITER"], Duration::hours(1));
                let token = with_token.then_some(t.as_str());
                prop_assert_eq!(authorizer().decide(&Method::OPTIONS, &p, token), Decision::Public);
            }

            /// Property: protected routes never authorize without a valid, unexpired token.
            #[test]
            fn protected_routes_need_a_live_token(m in method(), p in path(), r in roles()) {
                let authz = authorizer();
                prop_assume!(!authz.is_public(&m, &p));

                let expired = token(&r, Duration::seconds(-1));
                let foreign = TokenCodec::new(
                    SigningKey::from_bytes(b"some-other-key-of-enough-length!").unwrap(),
                )
                .encode("user-42", &r[..], Duration::hours(1))
                .unwrap();

                for t in [None, Some(expired.as_str()), Some(foreign.as_str())] {
                    let decision = authz.decide(&m, &p, t);
                    prop_assert!(
                        matches!(decision, Decision::Unauthenticated(_)),
                        "expected Unauthenticated, got {:?}",
                        decision
                    );
                }
            }
        }
    }
}
