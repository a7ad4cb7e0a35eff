//! Handler answering every request with a fixed response.
//!
//! Used for health, maintenance and command-style endpoints that need no
//! upstream.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use serde::Deserialize;

use crate::handlers::HandlerOptions;
use crate::registry::{ConfigSource, Handler, HandlerDescriptor, HandlerError, InitOutcome, TaskContext};

pub const KIND: &str = "static";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct StaticSettings {
    status: u16,
    body: String,
    content_type: String,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "text/plain; charset=utf-8".to_string(),
        }
    }
}

#[derive(Debug)]
struct Prepared {
    status: StatusCode,
    content_type: HeaderValue,
    body: String,
}

pub struct StaticResponseHandler {
    name: String,
    source: ConfigSource,
    vetoing: bool,
    prepared: ArcSwapOption<Prepared>,
}

impl StaticResponseHandler {
    pub fn new(name: impl Into<String>, source: ConfigSource, vetoing: bool) -> Self {
        Self {
            name: name.into(),
            source,
            vetoing,
            prepared: ArcSwapOption::empty(),
        }
    }

    fn prepare(&self) -> Result<Prepared, HandlerError> {
        let settings: StaticSettings = self.source.parse()?;
        let status = StatusCode::from_u16(settings.status)
            .map_err(|_| HandlerError::Config(format!("invalid status code {}", settings.status)))?;
        let content_type = HeaderValue::from_str(&settings.content_type)
            .map_err(|_| HandlerError::Config(format!("invalid content type {}", settings.content_type)))?;
        Ok(Prepared {
            status,
            content_type,
            body: settings.body,
        })
    }
}

pub fn build(descriptor: &HandlerDescriptor, options: &HandlerOptions) -> Result<Arc<dyn Handler>, HandlerError> {
    Ok(Arc::new(StaticResponseHandler::new(
        descriptor.name(),
        descriptor.config_source().clone(),
        options.vetoing,
    )))
}

#[async_trait]
impl Handler for StaticResponseHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        KIND
    }

    async fn init(&self, _ctx: &TaskContext) -> InitOutcome {
        match self.prepare() {
            Ok(prepared) => {
                self.prepared.store(Some(Arc::new(prepared)));
                InitOutcome::success()
            }
            Err(e) => InitOutcome::failure(self.vetoing, e),
        }
    }

    async fn shutdown(&self, _ctx: &TaskContext) -> Result<(), HandlerError> {
        self.prepared.store(None);
        Ok(())
    }

    async fn handle(&self, _request: Request<Body>) -> Result<Response<Body>, HandlerError> {
        let prepared = self
            .prepared
            .load_full()
            .ok_or_else(|| HandlerError::Unavailable(format!("{} is not initialized", self.name)))?;

        Response::builder()
            .status(prepared.status)
            .header(header::CONTENT_TYPE, prepared.content_type.clone())
            .body(Body::from(prepared.body.clone()))
            .map_err(|e| HandlerError::with_source("could not build static response", e))
    }
}
