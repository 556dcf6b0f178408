//! Relaying admitted requests to the backend services.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, HeaderName, Request},
    response::Response,
};
use reqwest::Url;
use tracing::debug;

use hiregate_core::{CoreResult, PathTemplate};

use crate::errors::GateError;
use crate::gate::ensure_plain_path;

/// Largest request body the gateway buffers before relaying.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Ordered path-template to base-URL routes. First match wins.
#[derive(Debug, Clone, Default)]
pub struct UpstreamTable {
    routes: Vec<(PathTemplate, Url)>,
}

impl UpstreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, template: &str, base: Url) -> CoreResult<Self> {
        self.routes.push((PathTemplate::parse(template)?, base));
        Ok(self)
    }

    /// Auth, job and candidate services of the hiring platform.
    pub fn hiring_platform(auth: Url, job: Url, candidate: Url) -> CoreResult<Self> {
        Self::new()
            .route("/register", auth.clone())?
            .route("/login", auth.clone())?
            .route("/users/**", auth)?
            .route("/posts/**", job)?
            .route("/candidate/**", candidate)
    }

    pub fn resolve(&self, path: &str) -> Option<&Url> {
        self.routes
            .iter()
            .find(|(template, _)| template.matches(path))
            .map(|(_, base)| base)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Append `path_and_query` to `base`, keeping any path prefix `base` carries.
///
/// `path_and_query` must already have passed [`ensure_plain_path`]; with no
/// dot segments left, parsing cannot move the path away from the one the
/// gate decided on.
fn join(base: &Url, path_and_query: &str) -> Result<Url, GateError> {
    let prefix = base.as_str().trim_end_matches('/');
    Url::parse(&format!("{prefix}{path_and_query}"))
        .map_err(|e| GateError::Internal(format!("cannot build upstream url: {e}")))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    table: Arc<UpstreamTable>,
}

impl Forwarder {
    pub fn new(table: UpstreamTable, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            table: Arc::new(table),
        })
    }

    pub fn table(&self) -> &UpstreamTable {
        &self.table
    }

    pub async fn relay(&self, req: Request<Body>) -> Result<Response, GateError> {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path();
        ensure_plain_path(path)?;

        let base = self
            .table
            .resolve(path)
            .ok_or_else(|| GateError::NoUpstream(path.to_owned()))?;
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(path);
        let target = join(base, path_and_query)?;

        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| GateError::UnreadableBody(e.to_string()))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        debug!(method = %parts.method, %target, "forwarding");
        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| GateError::UpstreamUnavailable(e.to_string()))?;

        let mut response = Response::builder()
            .status(upstream.status())
            .body(Body::empty())
            .map_err(|e| GateError::Internal(e.to_string()))?;
        let mut relayed = upstream.headers().clone();
        strip_hop_by_hop(&mut relayed);
        relayed.remove(header::CONTENT_LENGTH);
        *response.headers_mut() = relayed;
        *response.body_mut() = Body::from_stream(upstream.bytes_stream());

        Ok(response)
    }
}

/// Router fallback: relay whatever the gate admitted.
pub async fn forward(State(forwarder): State<Forwarder>, req: Request<Body>) -> Result<Response, GateError> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    forwarder
        .relay(req)
        .await
        .inspect_err(|e| e.log_rejection(&method, &path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn table() -> UpstreamTable {
        UpstreamTable::hiring_platform(
            url("http://auth:8081"),
            url("http://jobs:8082"),
            url("http://candidates:8083/api/"),
        )
        .unwrap()
    }

    #[test]
    fn routes_resolve_by_prefix_family() {
        let t = table();
        assert_eq!(t.len(), 5);
        assert_eq!(t.resolve("/login").unwrap().as_str(), "http://auth:8081/");
        assert_eq!(t.resolve("/users/3/roles").unwrap().as_str(), "http://auth:8081/");
        assert_eq!(t.resolve("/posts/apply/9").unwrap().as_str(), "http://jobs:8082/");
        assert_eq!(
            t.resolve("/candidate/profile").unwrap().as_str(),
            "http://candidates:8083/api/"
        );
    }

    #[test]
    fn unknown_paths_have_no_upstream() {
        let t = table();
        assert!(t.resolve("/admin").is_none());
        assert!(t.resolve("/posts").is_none());
        assert!(t.resolve("/login/extra").is_none());
    }

    #[test]
    fn join_keeps_base_prefix_and_query() {
        let joined = join(&url("http://candidates:8083/api/"), "/candidate/profile?x=1").unwrap();
        assert_eq!(joined.as_str(), "http://candidates:8083/api/candidate/profile?x=1");

        let joined = join(&url("http://jobs:8082"), "/posts/all").unwrap();
        assert_eq!(joined.as_str(), "http://jobs:8082/posts/all");
    }

    #[tokio::test]
    async fn relay_refuses_dot_segments_before_resolving() {
        let forwarder = Forwarder::new(table(), Duration::from_secs(1)).unwrap();
        for path in ["/posts/search/x/../../candidate/profile/1", "/posts/%2e%2e/candidate"] {
            let req = Request::builder().uri(path).body(Body::empty()).unwrap();
            let err = forwarder.relay(req).await.unwrap_err();
            assert!(matches!(err, GateError::UnsafePath(_)), "{path}: {err:?}");
        }
    }

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer t".parse().unwrap());
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::AUTHORIZATION));
    }

    #[test]
    fn bad_templates_are_rejected() {
        assert!(UpstreamTable::new().route("posts/**", url("http://x")).is_err());
    }
}
