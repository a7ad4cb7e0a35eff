//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Resolve a request to the name of the handler serving it
//!
//! # Design Decisions
//! - Immutable after construction; a config reload builds a new router
//! - Routes name handlers, never hold them: the registry is consulted per
//!   request, so a handler mid-reinit is simply "not found"
//! - Higher priority first; equal priority keeps declaration order

use axum::body::Body;
use axum::http::Request;

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub handler: String,
    pub priority: u32,
    matcher: AndMatcher,
}

impl Route {
    pub fn from_config(config: RouteConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = config.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        if let Some(prefix) = config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        Self {
            name: config.name,
            handler: config.handler,
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(configs: Vec<RouteConfig>) -> Self {
        let mut routes: Vec<Route> = configs.into_iter().map(Route::from_config).collect();
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    /// First matching route, or `None`.
    pub fn match_request(&self, req: &Request<Body>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(req))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
