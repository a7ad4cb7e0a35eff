//! Handler proxy server.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http server ──▶ routing ──▶ registry.handler(name) ──▶ handler.handle()
//!                                              │
//!                                   ┌──────────┴───────────┐
//!                                   │   HandlerRegistry    │
//!                                   │  scheduler │ table   │◀── admin API (reinit/reload)
//!                                   └──────────▲───────────┘
//!                                              │
//!                 config file ──▶ watcher ──▶ reload (retire / init, swap routes)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use handler_proxy::admin::{setup_admin_router, AdminState};
use handler_proxy::config::watcher::ConfigWatcher;
use handler_proxy::config::{load_config, ProxyConfig};
use handler_proxy::handlers::HandlerCatalog;
use handler_proxy::http::{AppState, HttpServer};
use handler_proxy::lifecycle::{
    apply_handler_changes, diff_handlers, start_handlers, task_context, wait_for_signal, Shutdown,
};
use handler_proxy::observability::{logging, metrics};
use handler_proxy::registry::{HandlerRegistry, TaskContext};
use handler_proxy::routing::Router as ProxyRouter;

#[derive(Parser)]
#[command(name = "handler-proxy", version, about = "Request-handling proxy with pluggable handlers")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "proxy.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "handler-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        handlers = config.handlers.len(),
        routes = config.routes.len(),
        init_concurrency = config.registry.init_concurrency,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let catalog = HandlerCatalog::builtin();
    let ctx = task_context();
    let registry = start_handlers(&config, &catalog, &ctx).await?;

    let shutdown = Shutdown::new();
    let state = AppState::new(registry.clone(), ProxyRouter::from_config(config.routes.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&config, state.clone());
    let http_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    if config.admin.enabled {
        let admin = setup_admin_router(AdminState {
            registry: registry.clone(),
            ctx: ctx.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let kinds = catalog.kinds();
    let (watcher, updates) = ConfigWatcher::new(&args.config, &kinds);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    let reload_task = tokio::spawn(reload_loop(
        config,
        updates,
        registry.clone(),
        catalog,
        ctx.clone(),
        state,
        shutdown.clone(),
    ));

    let signal = wait_for_signal().await;
    tracing::info!(signal, "Shutdown signal received");
    shutdown.trigger();

    if let Err(e) = http_task.await? {
        tracing::error!(error = %e, "HTTP server error");
    }
    let _ = reload_task.await;
    registry.shutdown(&ctx).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn reload_loop(
    mut current: ProxyConfig,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    registry: Arc<HandlerRegistry>,
    catalog: HandlerCatalog,
    ctx: TaskContext,
    state: AppState,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            update = updates.recv() => {
                let Some(next) = update else { break };
                let changes = diff_handlers(&current.handlers, &next.handlers);
                if !changes.is_empty() {
                    let report = apply_handler_changes(&registry, &catalog, &changes, &ctx).await;
                    for error in &report.errors {
                        tracing::error!(error = %error, "Handler reload error");
                    }
                }
                state.routes.store(Arc::new(ProxyRouter::from_config(next.routes.clone())));
                tracing::info!(routes = next.routes.len(), "Configuration reloaded");
                current = next;
            }
        }
    }
}
