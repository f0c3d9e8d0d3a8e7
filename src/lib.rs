//! Cluster master daemon library.
//!
//! # Architecture Overview
//!
//! ```text
//!   argv + MASTER_* env
//!        │
//!        ▼
//!   ┌─────────┐   PROCESS_IP/PORT   ┌─────────┐
//!   │ config  │────────────────────▶│ runtime │ (bind once)
//!   └────┬────┘                     └────┬────┘
//!        │                               │ listener
//!        ▼                               ▼
//!   ┌──────────────────────────────────────────────────┐
//!   │                   bootstrap                      │
//!   │                                                  │
//!   │  allocator ──▶ master ◀── files      http ◀──────┤
//!   │  (DRF actor)   (actor)   (registry)  (axum)      │
//!   │                  ▲                               │
//!   │                  │ leader_detected               │
//!   │              detector (standalone | zookeeper)   │
//!   └──────────────────────────────────────────────────┘
//! ```
//!
//! Teardown runs in the reverse dependency order: master, allocator handle,
//! allocator policy, detector, then the HTTP server.

// Core subsystems
pub mod allocator;
pub mod bootstrap;
pub mod config;
pub mod detector;
pub mod files;
pub mod ids;
pub mod master;
pub mod runtime;
pub mod zookeeper;

// Cross-cutting concerns
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use bootstrap::{Bootstrap, BootstrapError, ExitStatus, Running, TeardownReport, TeardownStage};
pub use config::{MasterConfig, ENV_NAMESPACE};
pub use lifecycle::Shutdown;
pub use master::{MasterClient, Pid};
