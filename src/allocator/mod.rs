//! Resource allocation subsystem.
//!
//! # Data Flow
//! ```text
//! master ── Allocator (handle, mailbox sender)
//!              → process.rs (actor task, owns the policy)
//!                  → policy.rs (HierarchicalDrfPolicy)
//!                      → sorter.rs (DRF over roles, then frameworks)
//!              ← Vec<Allocation> (oneshot reply)
//! ```
//!
//! # Design Decisions
//! - The policy is never shared; only the actor touches it
//! - The actor stops when the last handle drops, so the orchestrator releases
//!   the handle first and then joins the process
//! - Each allocation hands out an agent's whole free vector

pub mod policy;
pub mod process;
pub mod resources;
pub mod sorter;

use thiserror::Error;

pub use policy::{Allocation, AllocatorPolicy, HierarchicalDrfPolicy};
pub use process::{spawn, Allocator, AllocatorProcess};
pub use resources::Resources;
pub use sorter::DrfSorter;

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("Allocator process is no longer running")]
    Closed,

    #[error("Allocator process failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
