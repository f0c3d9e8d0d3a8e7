//! HTTP surface of the master.
//!
//! # Data Flow
//! ```text
//! runtime listener
//!     → server.rs (Axum router, request ID, timeout, trace)
//!     → handlers.rs
//!         /health, /master/state   → MasterClient
//!         /files/browse, /files/read → FileRegistry
//!         /metrics                 → Prometheus handle
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
