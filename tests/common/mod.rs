//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use handler_proxy::registry::{
    FixedSampleRateTraceFilter, Handler, HandlerDescriptor, HandlerError, HandlerRegistration,
    InitOutcome, LoadOrder, TaskContext, TraceFilter,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What the next `init` call reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Veto,
    NonVeto,
    Panic,
}

/// Ordered record of lifecycle calls across handlers, e.g. "init:auth".
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

/// Tracks how many inits run at the same time.
#[derive(Debug, Clone, Default)]
pub struct Concurrency {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Handler whose lifecycle behavior is scripted by the test.
pub struct ScriptedHandler {
    name: String,
    script: Mutex<Script>,
    init_delay: Duration,
    shutdown_delay: Duration,
    log: EventLog,
    concurrency: Concurrency,
    fail_activate: AtomicBool,
    fail_shutdown: AtomicBool,
    trace_rate: Option<u64>,
    pub inits: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(Script::Succeed),
            init_delay: Duration::ZERO,
            shutdown_delay: Duration::ZERO,
            log: log.clone(),
            concurrency: Concurrency::default(),
            fail_activate: AtomicBool::new(false),
            fail_shutdown: AtomicBool::new(false),
            trace_rate: None,
            inits: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn script(self, script: Script) -> Self {
        *self.script.lock().unwrap() = script;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn slow_shutdown(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub fn tracked(mut self, concurrency: &Concurrency) -> Self {
        self.concurrency = concurrency.clone();
        self
    }

    pub fn traced(mut self, rate: u64) -> Self {
        self.trace_rate = Some(rate);
        self
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn fail_activate(&self, fail: bool) {
        self.fail_activate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_shutdown(&self, fail: bool) {
        self.fail_shutdown.store(fail, Ordering::SeqCst);
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "scripted"
    }

    async fn init(&self, _ctx: &TaskContext) -> InitOutcome {
        self.log.push(format!("init-start:{}", self.name));
        self.inits.fetch_add(1, Ordering::SeqCst);
        self.concurrency.enter();
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        self.concurrency.exit();
        self.log.push(format!("init:{}", self.name));

        let script = *self.script.lock().unwrap();
        match script {
            Script::Succeed => InitOutcome::success(),
            Script::Veto => InitOutcome::veto(HandlerError::Unavailable(format!("{} cannot start", self.name))),
            Script::NonVeto => InitOutcome::non_veto(HandlerError::msg(format!("{} degraded", self.name))),
            Script::Panic => panic!("{} init panicked", self.name),
        }
    }

    fn activate(&self) -> Result<(), HandlerError> {
        self.log.push(format!("activate:{}", self.name));
        if self.fail_activate.load(Ordering::SeqCst) {
            return Err(HandlerError::msg("activation refused"));
        }
        Ok(())
    }

    fn deactivate(&self) -> Result<(), HandlerError> {
        self.log.push(format!("deactivate:{}", self.name));
        Ok(())
    }

    async fn shutdown(&self, _ctx: &TaskContext) -> Result<(), HandlerError> {
        self.log.push(format!("shutdown:{}", self.name));
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if !self.shutdown_delay.is_zero() {
            tokio::time::sleep(self.shutdown_delay).await;
        }
        if self.fail_shutdown.load(Ordering::SeqCst) {
            return Err(HandlerError::msg("shutdown refused"));
        }
        Ok(())
    }

    fn trace_filter(&self) -> Option<Arc<dyn TraceFilter>> {
        let rate = self.trace_rate?;
        let filter: Arc<dyn TraceFilter> = Arc::new(FixedSampleRateTraceFilter::new(rate));
        Some(filter)
    }

    async fn handle(&self, _request: Request<Body>) -> Result<Response<Body>, HandlerError> {
        Ok(Response::new(Body::from(self.name.clone())))
    }
}

/// Registration resolving to one prebuilt handler.
pub fn registration(handler: &Arc<ScriptedHandler>, order: LoadOrder) -> HandlerRegistration {
    let descriptor = HandlerDescriptor::new(handler.name(), "1.0", order, Default::default());
    let handler: Arc<dyn Handler> = handler.clone();
    HandlerRegistration::single(descriptor, handler)
}

/// Write a minimal HTTP/1.1 response after reading the request head.
async fn respond(socket: &mut tokio::net::TcpStream, status: u16, body: &str) {
    let mut buf = vec![0u8; 4096];
    let mut head = Vec::new();
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "OK",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a mock upstream on an ephemeral port returning a fixed response.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

/// Start a mock upstream whose response is computed per request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let (status, body) = f().await;
                respond(&mut socket, status, &body).await;
            });
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
