//! The route policy table.
//!
//! Rules live in three partitions, checked in a fixed order by the decision
//! engine: public, authenticated-any, role-restricted. Within a partition the
//! first structurally matching rule wins, which is why [`RoutePolicyBuilder::build`]
//! refuses tables where the same template is claimed by two partitions for
//! overlapping methods.
//!
//! A built [`RoutePolicy`] has no mutators; share it behind an `Arc`.

use std::collections::BTreeMap;

use http::Method;
use serde::Deserialize;
use thiserror::Error;

use hiregate_core::{CoreError, PathTemplate};

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error(transparent)]
    Template(#[from] CoreError),

    #[error("role name must not be empty (path '{0}')")]
    EmptyRole(String),

    #[error("'{method} {template}' is declared both {first} and {second}")]
    Conflict {
        method: String,
        template: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("invalid policy document: {0}")]
    Document(String),
}

/// Which request methods a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodConstraint {
    /// Any method (used for `register`/`login` style endpoints).
    Any,
    Only(Method),
}

impl MethodConstraint {
    pub fn permits(&self, method: &Method) -> bool {
        match self {
            MethodConstraint::Any => true,
            MethodConstraint::Only(m) => m == method,
        }
    }

    fn overlaps(&self, other: &MethodConstraint) -> bool {
        match (self, other) {
            (MethodConstraint::Only(a), MethodConstraint::Only(b)) => a == b,
            _ => true,
        }
    }

    fn parse(raw: &str) -> Result<Self, PolicyError> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(MethodConstraint::Any);
        }
        Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
            .map(MethodConstraint::Only)
            .map_err(|_| PolicyError::Document(format!("invalid method '{raw}'")))
    }
}

impl core::fmt::Display for MethodConstraint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MethodConstraint::Any => f.write_str("*"),
            MethodConstraint::Only(m) => f.write_str(m.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Public,
    AuthenticatedAny,
    RequiresRole(Role),
}

impl Requirement {
    pub fn kind(&self) -> &'static str {
        match self {
            Requirement::Public => "public",
            Requirement::AuthenticatedAny => "authenticated",
            Requirement::RequiresRole(_) => "role-restricted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub method: MethodConstraint,
    pub template: PathTemplate,
    pub requirement: Requirement,
}

impl RouteRule {
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.permits(method) && self.template.matches(path)
    }
}

impl core::fmt::Display for RouteRule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} ({})", self.method, self.template, self.requirement.kind())?;
        if let Requirement::RequiresRole(role) = &self.requirement {
            write!(f, " [{role}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    public: Vec<RouteRule>,
    authenticated: Vec<RouteRule>,
    role_restricted: Vec<RouteRule>,
}

impl RoutePolicy {
    pub fn builder() -> RoutePolicyBuilder {
        RoutePolicyBuilder::default()
    }

    /// The hiring platform's route table.
    pub fn hiring_platform() -> Result<Self, PolicyError> {
        RoutePolicy::builder()
            .public_any_method("/register")
            .public_any_method("/login")
            .public(Method::GET, "/posts/all")
            .public(Method::GET, "/posts/search/**")
            .public(Method::GET, "/posts/{id}")
            .authenticated(Method::GET, "/candidate/profile/**")
            .role("RECRUITER", Method::POST, "/posts/add")
            .role("JOB_SEEKER", Method::POST, "/posts/apply/**")
            .role("JOB_SEEKER", Method::POST, "/candidate/profile")
            .build()
    }

    /// Load a table from a JSON rule document:
    ///
    /// ```json
    /// {
    ///   "public":        [{"method": "*",   "path": "/login"}],
    ///   "authenticated": [{"method": "GET", "path": "/candidate/profile/**"}],
    ///   "roles": {"RECRUITER": [{"method": "POST", "path": "/posts/add"}]}
    /// }
    /// ```
    pub fn from_json(document: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument =
            serde_json::from_str(document).map_err(|e| PolicyError::Document(e.to_string()))?;

        let mut builder = RoutePolicy::builder();
        for rule in doc.public {
            builder = builder.push(MethodConstraint::parse(&rule.method)?, rule.path, Requirement::Public);
        }
        for rule in doc.authenticated {
            builder = builder.push(
                MethodConstraint::parse(&rule.method)?,
                rule.path,
                Requirement::AuthenticatedAny,
            );
        }
        for (role, rules) in doc.roles {
            for rule in rules {
                builder = builder.push(
                    MethodConstraint::parse(&rule.method)?,
                    rule.path,
                    Requirement::RequiresRole(Role::new(role.clone())),
                );
            }
        }
        builder.build()
    }

    /// `OPTIONS` is always public so cross-origin preflight never needs a token.
    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        *method == Method::OPTIONS || self.match_public(method, path).is_some()
    }

    pub fn match_public(&self, method: &Method, path: &str) -> Option<&RouteRule> {
        self.public.iter().find(|r| r.matches(method, path))
    }

    pub fn match_authenticated(&self, method: &Method, path: &str) -> Option<&RouteRule> {
        self.authenticated.iter().find(|r| r.matches(method, path))
    }

    pub fn match_role(&self, role: &Role, method: &Method, path: &str) -> Option<&RouteRule> {
        self.role_restricted.iter().find(|r| {
            matches!(&r.requirement, Requirement::RequiresRole(required) if required == role)
                && r.matches(method, path)
        })
    }

    /// A public rule and a protected rule that both claim this request.
    ///
    /// `build` only catches identical templates; overlapping wildcards can
    /// still collide, and such a table cannot be evaluated safely.
    pub fn contradiction(&self, method: &Method, path: &str) -> Option<(&RouteRule, &RouteRule)> {
        if *method == Method::OPTIONS {
            return None;
        }
        let public = self.match_public(method, path)?;
        let protected = self
            .authenticated
            .iter()
            .chain(&self.role_restricted)
            .find(|r| r.matches(method, path))?;
        Some((public, protected))
    }

    pub fn rules(&self) -> impl Iterator<Item = &RouteRule> {
        self.public
            .iter()
            .chain(&self.authenticated)
            .chain(&self.role_restricted)
    }

    pub fn len(&self) -> usize {
        self.public.len() + self.authenticated.len() + self.role_restricted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    #[serde(default)]
    public: Vec<RuleSpec>,
    #[serde(default)]
    authenticated: Vec<RuleSpec>,
    #[serde(default)]
    roles: BTreeMap<String, Vec<RuleSpec>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    method: String,
    path: String,
}

/// Collects rules in declaration order; templates are parsed and the table
/// is checked for contradictions in [`RoutePolicyBuilder::build`].
#[derive(Debug, Default)]
pub struct RoutePolicyBuilder {
    pending: Vec<(MethodConstraint, String, Requirement)>,
}

impl RoutePolicyBuilder {
    pub fn public(self, method: Method, template: impl Into<String>) -> Self {
        self.push(MethodConstraint::Only(method), template, Requirement::Public)
    }

    pub fn public_any_method(self, template: impl Into<String>) -> Self {
        self.push(MethodConstraint::Any, template, Requirement::Public)
    }

    pub fn authenticated(self, method: Method, template: impl Into<String>) -> Self {
        self.push(MethodConstraint::Only(method), template, Requirement::AuthenticatedAny)
    }

    pub fn role(self, role: impl Into<String>, method: Method, template: impl Into<String>) -> Self {
        self.push(
            MethodConstraint::Only(method),
            template,
            Requirement::RequiresRole(Role::new(role.into())),
        )
    }

    pub fn push(
        mut self,
        method: MethodConstraint,
        template: impl Into<String>,
        requirement: Requirement,
    ) -> Self {
        self.pending.push((method, template.into(), requirement));
        self
    }

    pub fn build(self) -> Result<RoutePolicy, PolicyError> {
        let mut rules: Vec<RouteRule> = Vec::with_capacity(self.pending.len());

        for (method, raw, requirement) in self.pending {
            if let Requirement::RequiresRole(role) = &requirement {
                if role.is_empty() {
                    return Err(PolicyError::EmptyRole(raw));
                }
            }
            let template = PathTemplate::parse(&raw)?;

            if let Some(existing) = rules.iter().find(|r| {
                r.template == template
                    && r.method.overlaps(&method)
                    && r.requirement.kind() != requirement.kind()
            }) {
                return Err(PolicyError::Conflict {
                    method: method.to_string(),
                    template: raw,
                    first: existing.requirement.kind(),
                    second: requirement.kind(),
                });
            }

            rules.push(RouteRule {
                method,
                template,
                requirement,
            });
        }

        let mut policy = RoutePolicy::default();
        for rule in rules {
            match rule.requirement {
                Requirement::Public => policy.public.push(rule),
                Requirement::AuthenticatedAny => policy.authenticated.push(rule),
                Requirement::RequiresRole(_) => policy.role_restricted.push(rule),
            }
        }
        Ok(policy)
    }
}
