//! Upstream selection strategies.
//!
//! Unhealthy upstreams are skipped while at least one healthy upstream
//! remains. When every upstream is unhealthy the whole set is eligible
//! again, so passive health can recover without active probing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use crate::handlers::http_proxy::upstream::Upstream;

pub trait Balancer: Send + Sync + std::fmt::Debug {
    fn next(&self, upstreams: &[Arc<Upstream>]) -> Option<Arc<Upstream>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    LeastConnections,
}

impl Strategy {
    pub fn balancer(self) -> Box<dyn Balancer> {
        match self {
            Strategy::RoundRobin => Box::new(RoundRobin::default()),
            Strategy::LeastConnections => Box::new(LeastConnections),
        }
    }
}

fn any_healthy(upstreams: &[Arc<Upstream>]) -> bool {
    upstreams.iter().any(|u| u.is_healthy())
}

#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl Balancer for RoundRobin {
    fn next(&self, upstreams: &[Arc<Upstream>]) -> Option<Arc<Upstream>> {
        if upstreams.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = upstreams.len();
        let fail_open = !any_healthy(upstreams);

        (0..len)
            .map(|i| &upstreams[(start + i) % len])
            .find(|u| fail_open || u.is_healthy())
            .cloned()
    }
}

/// Picks the upstream with the fewest in-flight requests; ties go to the first.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl Balancer for LeastConnections {
    fn next(&self, upstreams: &[Arc<Upstream>]) -> Option<Arc<Upstream>> {
        let fail_open = !any_healthy(upstreams);
        upstreams
            .iter()
            .filter(|u| fail_open || u.is_healthy())
            .min_by_key(|u| u.active_connections())
            .cloned()
    }
}
