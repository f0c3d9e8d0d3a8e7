//! Minimal ZooKeeper client used for master group membership.
//!
//! # Data Flow
//! ```text
//! ZkSession::connect (handshake, negotiated timeout)
//!     → authenticate (digest credentials, optional)
//!     → ensure_path / create (ephemeral sequential member)
//!     → get_children + get_data (watch set)
//!     → next_event (pings while idle, returns on watch)
//!     → close
//! ```
//!
//! # Design Decisions
//! - One outstanding request at a time; the group protocol never pipelines
//! - A reader task turns the socket into a frame channel so waits stay cancel-safe
//! - Any session error is terminal for the session; callers reconnect

pub mod proto;
pub mod session;

use thiserror::Error;

pub use session::ZkSession;

/// Errors raised by a ZooKeeper session.
#[derive(Debug, Error)]
pub enum ZkError {
    #[error("ZooKeeper I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZooKeeper request timed out")]
    Timeout,

    #[error("ZooKeeper connection lost")]
    ConnectionLost,

    #[error("ZooKeeper session expired")]
    SessionExpired,

    #[error("ZooKeeper authentication failed")]
    AuthFailed,

    #[error("ZooKeeper server error code {0}")]
    Server(i32),

    #[error("ZooKeeper protocol error: {0}")]
    Protocol(String),
}
