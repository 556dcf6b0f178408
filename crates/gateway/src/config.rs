use anyhow::{Context, Result};
use reqwest::Url;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use hiregate_auth::{RoutePolicy, SigningKey};
use hiregate_observability::LogFormat;

use crate::upstream::UpstreamTable;

/// Gateway configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub signing_key: SigningKey,
    pub auth_service: Url,
    pub job_service: Url,
    pub candidate_service: Url,
    pub policy_file: Option<PathBuf>,
    pub log_format: LogFormat,
    pub upstream_timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let listen_addr = or("HIREGATE_LISTEN_ADDR", "0.0.0.0:8080")
            .parse()
            .with_context(|| "parse HIREGATE_LISTEN_ADDR")?;
        let secret = var("HIREGATE_JWT_SECRET").context("HIREGATE_JWT_SECRET must be set")?;
        let signing_key =
            SigningKey::from_base64(&secret).with_context(|| "decode HIREGATE_JWT_SECRET")?;
        let auth_service = Url::parse(&or("HIREGATE_AUTH_SERVICE_URL", "http://localhost:8081"))
            .with_context(|| "parse HIREGATE_AUTH_SERVICE_URL")?;
        let job_service = Url::parse(&or("HIREGATE_JOB_SERVICE_URL", "http://localhost:8082"))
            .with_context(|| "parse HIREGATE_JOB_SERVICE_URL")?;
        let candidate_service =
            Url::parse(&or("HIREGATE_CANDIDATE_SERVICE_URL", "http://localhost:8083"))
                .with_context(|| "parse HIREGATE_CANDIDATE_SERVICE_URL")?;
        let policy_file = var("HIREGATE_POLICY_FILE").map(PathBuf::from);
        let log_format = or("HIREGATE_LOG_FORMAT", "json")
            .parse()
            .with_context(|| "parse HIREGATE_LOG_FORMAT")?;
        let timeout_secs: u64 = or("HIREGATE_UPSTREAM_TIMEOUT_SECS", "30")
            .parse()
            .with_context(|| "parse HIREGATE_UPSTREAM_TIMEOUT_SECS")?;

        Ok(Self {
            listen_addr,
            signing_key,
            auth_service,
            job_service,
            candidate_service,
            policy_file,
            log_format,
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// The rule table: the JSON document at `policy_file`, or the built-in one.
    pub fn route_policy(&self) -> Result<RoutePolicy> {
        match &self.policy_file {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("read HIREGATE_POLICY_FILE: {}", path.display()))?;
                RoutePolicy::from_json(&contents).with_context(|| "parse route policy document")
            }
            None => RoutePolicy::hiring_platform().with_context(|| "build built-in route policy"),
        }
    }

    pub fn upstream_table(&self) -> Result<UpstreamTable> {
        UpstreamTable::hiring_platform(
            self.auth_service.clone(),
            self.job_service.clone(),
            self.candidate_service.clone(),
        )
        .with_context(|| "build upstream table")
    }
}
