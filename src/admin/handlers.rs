use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::registry::{error_chain, CycleTrigger, HandlerStatus};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub handlers_active: usize,
    pub handlers_known: usize,
}

/// Result of a reinit or reload request.
#[derive(Debug, Serialize)]
pub struct CycleReport {
    pub handler: String,
    pub action: String,
    pub ok: bool,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Vec<String>>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        handlers_active: state.registry.handlers().len(),
        handlers_known: state.registry.statuses().len(),
    })
}

pub async fn list_handlers(State(state): State<AdminState>) -> Json<Vec<HandlerStatus>> {
    Json(state.registry.statuses())
}

pub async fn get_handler(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    match state.registry.member(&name) {
        Some(handler) => Json(handler.status()).into_response(),
        None => not_found(&name),
    }
}

pub async fn reinit_handler(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    cycle(state, name, CycleTrigger::Reinit).await
}

pub async fn reload_handler(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    cycle(state, name, CycleTrigger::Reload).await
}

async fn cycle(state: AdminState, name: String, trigger: CycleTrigger) -> Response {
    if state.registry.member(&name).is_none() {
        return not_found(&name);
    }

    let result = match trigger {
        CycleTrigger::Reinit => state.registry.reinit_handler(&name, &state.ctx).await,
        CycleTrigger::Reload => state.registry.reload_handler(&name, &state.ctx).await,
    };
    let handler_state = state
        .registry
        .member(&name)
        .map(|h| h.state().as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let (status, error) = match result {
        Ok(()) => (StatusCode::OK, None),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Some(error_chain(&e))),
    };

    let report = CycleReport {
        handler: name,
        action: trigger.to_string(),
        ok: error.is_none(),
        state: handler_state,
        error,
    };
    (status, Json(report)).into_response()
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("unknown handler {name}") })),
    )
        .into_response()
}
