//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch handler
//! - Wire up middleware (request ID, tracing, timeout, concurrency limit)
//! - Resolve each request to a handler name, then to an active handler
//! - Map handler errors to HTTP status codes
//! - Observability (metrics, sampled request tracing)

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::request::{request_id, UuidRequestId};
use crate::observability::metrics;
use crate::registry::{HandlerError, HandlerRegistry};
use crate::routing::Router as ProxyRouter;

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HandlerRegistry>,
    /// Swapped wholesale on config reload.
    pub routes: Arc<ArcSwap<ProxyRouter>>,
}

impl AppState {
    pub fn new(registry: Arc<HandlerRegistry>, routes: ProxyRouter) -> Self {
        Self {
            registry,
            routes: Arc::new(ArcSwap::from_pointee(routes)),
        }
    }
}

pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The Axum router, for serving on a custom listener or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until a shutdown message arrives, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn status_for(error: &HandlerError) -> StatusCode {
    match error {
        HandlerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        HandlerError::Upstream(_) => StatusCode::BAD_GATEWAY,
        HandlerError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let handler_name = match state.routes.load().match_request(&request) {
        Some(route) => route.handler.clone(),
        None => {
            tracing::debug!(request_id = %request_id, path = %path, "No route matched");
            metrics::record_request("none", 404, started);
            return (StatusCode::NOT_FOUND, "no route matched").into_response();
        }
    };

    // Inactive handlers (failed, retired or mid-reinit) are never in the table.
    let Some(handler) = state.registry.handler(&handler_name) else {
        tracing::warn!(request_id = %request_id, handler = %handler_name, "Handler not found");
        metrics::record_request(&handler_name, 404, started);
        return (StatusCode::NOT_FOUND, "handler not found").into_response();
    };

    let traced = state
        .registry
        .trace_filter_for_handler(&handler_name)
        .is_some_and(|filter| filter.should_trace(&format!("{method} {path}")));

    let response = match handler.handle(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, handler = %handler_name, error = %e, "Handler failed");
            (status_for(&e), e.to_string()).into_response()
        }
    };

    let status = response.status();
    metrics::record_request(&handler_name, status.as_u16(), started);
    if traced {
        tracing::info!(
            request_id = %request_id,
            handler = %handler_name,
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Traced request"
        );
    }

    response
}
