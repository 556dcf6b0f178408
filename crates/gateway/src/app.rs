use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tracing::info;

use hiregate_auth::{Authorizer, TokenCodec};

use crate::config::GatewayConfig;
use crate::middleware::{gate_middleware, GateState};
use crate::upstream::{forward, Forwarder};

/// Assemble the gateway from its configuration.
pub fn build_app(config: &GatewayConfig) -> Result<Router> {
    let policy = config.route_policy()?;
    info!(rules = policy.len(), custom = config.policy_file.is_some(), "route policy loaded");

    let codec = TokenCodec::new(config.signing_key.clone());
    let authorizer = Authorizer::new(Arc::new(policy), Arc::new(codec));

    let forwarder = Forwarder::new(config.upstream_table()?, config.upstream_timeout)
        .context("build upstream http client")?;

    Ok(router(Arc::new(authorizer), forwarder))
}

/// `/health` answers directly; every other request passes the gate and is
/// relayed upstream.
pub fn router(authorizer: Arc<Authorizer>, forwarder: Forwarder) -> Router {
    let gated = Router::new()
        .fallback(forward)
        .with_state(forwarder)
        .layer(from_fn_with_state(GateState::new(authorizer), gate_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(ServiceBuilder::new())
}

async fn health() -> StatusCode {
    StatusCode::OK
}
