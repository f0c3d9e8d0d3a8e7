//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! MASTER_* environment ─┐
//!                       ├─▶ loader.rs (merge, args win)
//! process arguments ────┘       → flags.rs (clap parse)
//!                               → --help? → LoadOutcome::Help
//!                               → schema.rs (MasterConfig, validated)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - Every flag has a default except `--ip` and `--log_dir`
//! - `--help` is an outcome, not an error; callers exit with status 1
//! - `--zk` is parsed here so a malformed endpoint never reaches the runtime

pub mod flags;
pub mod loader;
pub mod schema;

pub use flags::{usage, MasterFlags, DEFAULT_PORT};
pub use loader::{load, load_from, ConfigError, LoadOutcome, ENV_NAMESPACE};
pub use schema::{LogLevel, MasterConfig};
