//! Upstream server state.
//!
//! # Responsibilities
//! - Represent one upstream of an `http_proxy` handler
//! - Track in-flight requests (for least connections)
//! - Enforce the per-upstream connection limit
//! - Track passive health (Healthy/Unhealthy)

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

#[derive(Debug)]
pub struct Upstream {
    pub addr: SocketAddr,
    pub max_connections: usize,
    active_connections: AtomicUsize,
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl Upstream {
    pub fn new(addr: SocketAddr, max_connections: usize) -> Self {
        Self {
            addr,
            max_connections,
            active_connections: AtomicUsize::new(0),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Reserve a connection slot. `None` when the upstream is at its limit.
    pub fn try_acquire(self: &Arc<Self>) -> Option<UpstreamGuard> {
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return None;
            }
            match self
                .active_connections
                .compare_exchange_weak(prev, prev + 1, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(UpstreamGuard {
            upstream: self.clone(),
        })
    }

    /// Healthy or Unknown.
    pub fn is_healthy(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    pub fn mark_success(&self, healthy_threshold: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Healthy {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            tracing::info!(upstream = %self.addr, "Upstream marked healthy");
        }
    }

    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Unhealthy {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            tracing::warn!(upstream = %self.addr, failures, "Upstream marked unhealthy");
        }
    }
}

/// Releases the connection slot on drop.
#[derive(Debug)]
pub struct UpstreamGuard {
    upstream: Arc<Upstream>,
}

impl Deref for UpstreamGuard {
    type Target = Upstream;
    fn deref(&self) -> &Self::Target {
        &self.upstream
    }
}

impl Drop for UpstreamGuard {
    fn drop(&mut self) {
        self.upstream.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
