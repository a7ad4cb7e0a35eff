//! Reverse-proxy handler forwarding requests to a set of upstreams.
//!
//! # Data Flow
//! ```text
//! init:   parse settings → TCP probe every upstream → build state
//! handle: balancer picks upstream → reserve slot → rewrite URI
//!         → forward via shared client → passive health update
//! ```
//!
//! # Design Decisions
//! - Init succeeds when at least one upstream accepts a TCP connection
//! - The HTTP client comes from the task context when provided, so all
//!   handlers share one connection pool
//! - Health is passive only: 502/503/504 and transport errors count as
//!   failures

pub mod balancer;
pub mod upstream;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tokio::net::TcpStream;

use crate::handlers::HandlerOptions;
use crate::registry::{
    ConfigSource, FixedSampleRateTraceFilter, Handler, HandlerDescriptor, HandlerError, InitOutcome,
    TaskContext, TraceFilter,
};
use balancer::{Balancer, Strategy};
use upstream::Upstream;

pub const KIND: &str = "http_proxy";

/// Shared HTTP client, published as a task-context facility.
#[derive(Clone, Debug)]
pub struct UpstreamClient(Client<HttpConnector, Body>);

impl UpstreamClient {
    pub fn new() -> Self {
        Self(Client::builder(TokioExecutor::new()).build(HttpConnector::new()))
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    /// Upstream socket addresses, e.g. "10.0.0.5:8080".
    pub upstreams: Vec<String>,

    #[serde(default)]
    pub strategy: Strategy,

    /// In-flight request limit per upstream.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: usize,

    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: usize,

    /// Trace every Nth request; 0 disables tracing.
    #[serde(default)]
    pub trace_sample_rate: u64,

    /// Prefix removed from the path before forwarding.
    #[serde(default)]
    pub strip_prefix: Option<String>,
}

fn default_max_connections() -> usize {
    100
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_unhealthy_threshold() -> usize {
    3
}

fn default_healthy_threshold() -> usize {
    2
}

#[derive(Debug)]
struct ProxyState {
    settings: ProxySettings,
    upstreams: Vec<Arc<Upstream>>,
    balancer: Box<dyn Balancer>,
    client: UpstreamClient,
    trace_filter: Option<Arc<FixedSampleRateTraceFilter>>,
}

pub struct HttpProxyHandler {
    name: String,
    source: ConfigSource,
    vetoing: bool,
    state: ArcSwapOption<ProxyState>,
}

pub fn build(descriptor: &HandlerDescriptor, options: &HandlerOptions) -> Result<Arc<dyn Handler>, HandlerError> {
    Ok(Arc::new(HttpProxyHandler::new(
        descriptor.name(),
        descriptor.config_source().clone(),
        options.vetoing,
    )))
}

impl HttpProxyHandler {
    pub fn new(name: impl Into<String>, source: ConfigSource, vetoing: bool) -> Self {
        Self {
            name: name.into(),
            source,
            vetoing,
            state: ArcSwapOption::empty(),
        }
    }

    /// Upstreams of the current generation, empty when not initialized.
    pub fn upstreams(&self) -> Vec<Arc<Upstream>> {
        self.state
            .load_full()
            .map(|s| s.upstreams.clone())
            .unwrap_or_default()
    }

    async fn connect(&self, ctx: &TaskContext) -> Result<ProxyState, HandlerError> {
        let settings: ProxySettings = self.source.parse()?;
        if settings.upstreams.is_empty() {
            return Err(HandlerError::Config("no upstreams configured".into()));
        }

        let upstreams = settings
            .upstreams
            .iter()
            .map(|address| {
                address
                    .parse::<SocketAddr>()
                    .map(|addr| Arc::new(Upstream::new(addr, settings.max_connections)))
                    .map_err(|_| HandlerError::Config(format!("invalid upstream address {address}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let timeout = Duration::from_millis(settings.connect_timeout_ms);
        let mut reachable = 0;
        let mut last_error = None;
        for upstream in &upstreams {
            match probe(upstream.addr, timeout).await {
                Ok(()) => reachable += 1,
                Err(e) => {
                    tracing::warn!(handler = %self.name, upstream = %upstream.addr, error = %e, "Upstream probe failed");
                    upstream.mark_failure(settings.unhealthy_threshold);
                    last_error = Some(e);
                }
            }
        }

        if reachable == 0 {
            let message = format!("none of {} upstreams reachable", upstreams.len());
            return Err(match last_error {
                Some(e) => HandlerError::with_source(message, e),
                None => HandlerError::Unavailable(message),
            });
        }

        let client = ctx
            .facility::<UpstreamClient>()
            .map(|c| UpstreamClient::clone(&c))
            .unwrap_or_default();
        let trace_filter = (settings.trace_sample_rate > 0)
            .then(|| Arc::new(FixedSampleRateTraceFilter::new(settings.trace_sample_rate)));

        tracing::info!(
            handler = %self.name,
            upstreams = upstreams.len(),
            reachable,
            strategy = ?settings.strategy,
            "Proxy handler connected"
        );

        Ok(ProxyState {
            balancer: settings.strategy.balancer(),
            settings,
            upstreams,
            client,
            trace_filter,
        })
    }
}

async fn probe(addr: SocketAddr, timeout: Duration) -> io::Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, format!("connect to {addr} timed out"))),
    }
}

/// Point the request at `addr`, optionally removing a path prefix.
pub fn upstream_uri(original: &Uri, addr: SocketAddr, strip_prefix: Option<&str>) -> Result<Uri, HandlerError> {
    let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let path = strip_prefix
        .and_then(|prefix| path_and_query.strip_prefix(prefix))
        .unwrap_or(path_and_query);
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    format!("http://{addr}{path}")
        .parse::<Uri>()
        .map_err(|e| HandlerError::with_source("invalid upstream uri", e))
}

#[async_trait]
impl Handler for HttpProxyHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        KIND
    }

    async fn init(&self, ctx: &TaskContext) -> InitOutcome {
        match self.connect(ctx).await {
            Ok(state) => {
                self.state.store(Some(Arc::new(state)));
                InitOutcome::success()
            }
            Err(e) => InitOutcome::failure(self.vetoing, e),
        }
    }

    async fn shutdown(&self, _ctx: &TaskContext) -> Result<(), HandlerError> {
        if let Some(state) = self.state.swap(None) {
            let in_flight: usize = state.upstreams.iter().map(|u| u.active_connections()).sum();
            tracing::debug!(handler = %self.name, in_flight, "Proxy handler released upstreams");
        }
        Ok(())
    }

    fn trace_filter(&self) -> Option<Arc<dyn TraceFilter>> {
        let filter: Arc<dyn TraceFilter> = self.state.load_full()?.trace_filter.clone()?;
        Some(filter)
    }

    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, HandlerError> {
        let state = self
            .state
            .load_full()
            .ok_or_else(|| HandlerError::Unavailable(format!("{} is not initialized", self.name)))?;

        let upstream = state
            .balancer
            .next(&state.upstreams)
            .ok_or_else(|| HandlerError::Unavailable("no upstream available".into()))?;
        let guard = upstream
            .try_acquire()
            .ok_or_else(|| HandlerError::Unavailable(format!("upstream {} at connection limit", upstream.addr)))?;

        let (mut parts, body) = request.into_parts();
        parts.uri = upstream_uri(&parts.uri, guard.addr, state.settings.strip_prefix.as_deref())?;
        let request = Request::from_parts(parts, body);

        match state.client.0.request(request).await {
            Ok(response) => {
                match response.status() {
                    StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                        guard.mark_failure(state.settings.unhealthy_threshold)
                    }
                    _ => guard.mark_success(state.settings.healthy_threshold),
                }
                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Err(e) => {
                guard.mark_failure(state.settings.unhealthy_threshold);
                Err(HandlerError::Upstream(format!("request to {} failed: {e}", guard.addr)))
            }
        }
    }
}
