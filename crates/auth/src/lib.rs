//! `hiregate-auth`: token verification and route authorization (zero-trust).
//!
//! This crate is intentionally decoupled from any HTTP server and from
//! storage: it only needs a request method, a path and an optional bearer
//! token to reach a [`Decision`].

pub mod authorize;
pub mod claims;
pub mod codec;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{Authorizer, Decision, UnauthenticatedReason, authorize};
pub use claims::Claims;
pub use codec::{SigningKey, TokenCodec, TokenError};
pub use policy::{MethodConstraint, PolicyError, Requirement, RoutePolicy, RoutePolicyBuilder, RouteRule};
pub use principal::Identity;
pub use roles::Role;
