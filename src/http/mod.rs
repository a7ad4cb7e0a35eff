//! HTTP front of the proxy.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → routing (request → handler name)
//!     → registry lookup (active handler or 404)
//!     → handler.handle()
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
