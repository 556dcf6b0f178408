//! Edge gateway: authenticates bearer tokens, authorizes requests against the
//! route policy and relays admitted requests to the backend services.

pub mod app;
pub mod config;
pub mod context;
pub mod errors;
pub mod gate;
pub mod middleware;
pub mod upstream;
