//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! ZooKeeper session failure
//!     → backoff.rs (exponential delay with jitter, capped)
//!     → reconnect to the next server in the ensemble
//! ```
//!
//! # Design Decisions
//! - Delays are capped at the session timeout so a recovering ensemble is
//!   rejoined before the old member expires for long
//! - Jitter keeps standby masters from reconnecting in lockstep

pub mod backoff;
