//! Admin API: handler status and administrative reinit/reload.
//!
//! ```text
//! GET  /admin/status
//! GET  /admin/handlers
//! GET  /admin/handlers/{name}
//! POST /admin/handlers/{name}/reinit
//! POST /admin/handlers/{name}/reload
//! ```
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::registry::{HandlerRegistry, TaskContext};
use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<HandlerRegistry>,
    /// Context handed to handlers cycled through the API.
    pub ctx: TaskContext,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/handlers", get(list_handlers))
        .route("/admin/handlers/{name}", get(get_handler))
        .route("/admin/handlers/{name}/reinit", post(reinit_handler))
        .route("/admin/handlers/{name}/reload", post(reload_handler))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
