//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! bootstrap teardown
//!     → Shutdown::trigger()
//!     → every subscribed background task (HTTP server) drains and exits
//! ```
//!
//! # Design Decisions
//! - Long-lived actors (master, allocator) do not subscribe; they stop on
//!   their own terms and are joined explicitly
//! - Dropping the coordinator counts as a trigger, so early returns still
//!   stop subscribed tasks

pub mod shutdown;

pub use shutdown::Shutdown;
