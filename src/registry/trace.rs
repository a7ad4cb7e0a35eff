//! Per-handler trace filters.
//!
//! A trace filter is consulted by the request path to decide whether a
//! request served by a handler is recorded as a traced request. The registry
//! stores filters next to their handlers but never calls them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait TraceFilter: Send + Sync + fmt::Debug {
    /// Returns true if the named request should be traced.
    fn should_trace(&self, request_name: &str) -> bool;
}

/// Traces one request out of every `rate`.
///
/// A rate of 0 disables tracing, 1 traces everything.
#[derive(Debug)]
pub struct FixedSampleRateTraceFilter {
    rate: u64,
    counter: AtomicU64,
}

impl FixedSampleRateTraceFilter {
    pub fn new(rate: u64) -> Self {
        Self {
            rate,
            counter: AtomicU64::new(0),
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }
}

impl TraceFilter for FixedSampleRateTraceFilter {
    fn should_trace(&self, _request_name: &str) -> bool {
        match self.rate {
            0 => false,
            1 => true,
            rate => self.counter.fetch_add(1, Ordering::Relaxed) % rate == 0,
        }
    }
}
