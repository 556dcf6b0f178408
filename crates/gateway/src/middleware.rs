use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use hiregate_auth::Authorizer;

use crate::errors::GateError;
use crate::gate;

#[derive(Clone)]
pub struct GateState {
    pub authorizer: Arc<Authorizer>,
}

impl GateState {
    pub fn new(authorizer: Arc<Authorizer>) -> Self {
        Self { authorizer }
    }
}

/// Admit or reject every request before it reaches the forwarder.
///
/// Rejections produce exactly one log line and a bare status response.
pub async fn gate_middleware(
    State(state): State<GateState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, GateError> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let forwarded = gate::admit(&state.authorizer, req)
        .inspect_err(|e| e.log_rejection(&method, &path))?;

    debug!(%method, path, "request admitted");
    Ok(next.run(forwarded).await)
}
