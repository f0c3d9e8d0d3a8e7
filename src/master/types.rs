//! Master-facing records and errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocator::Resources;
use crate::ids::{AgentId, FrameworkId, OfferId};
use crate::master::Pid;

/// Default role of frameworks that do not name one.
pub const DEFAULT_ROLE: &str = "*";

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("Not the leading master (leader: {})", display_leader(.leader))]
    NotLeader { leader: Option<Pid> },

    #[error("Unknown framework {0}")]
    UnknownFramework(FrameworkId),

    #[error("Unknown agent {0}")]
    UnknownAgent(AgentId),

    #[error("Unknown offer {0}")]
    UnknownOffer(OfferId),

    #[error("Offer {0} does not contain the requested resources")]
    InsufficientResources(OfferId),

    #[error("Master has terminated")]
    Terminated,
}

fn display_leader(leader: &Option<Pid>) -> String {
    leader
        .as_ref()
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Registration request from a scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

impl FrameworkInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: default_role(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// Registration request from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub hostname: String,
    pub resources: Resources,
}

/// Resources of one agent offered to one framework.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    pub id: OfferId,
    pub framework_id: FrameworkId,
    pub agent_id: AgentId,
    pub resources: Resources,
}

/// Why the master's loop exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// An explicit shutdown request.
    Shutdown,
    /// Was leading and then lost leadership.
    LostLeadership,
    /// Every client handle was dropped.
    MailboxClosed,
    /// The task panicked or was aborted.
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSummary {
    pub id: FrameworkId,
    pub name: String,
    pub role: String,
    pub offers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub hostname: String,
    pub resources: Resources,
}

/// Point-in-time view served on `/master/state`.
#[derive(Debug, Clone, Serialize)]
pub struct MasterState {
    pub version: &'static str,
    pub pid: Pid,
    pub leader: Option<Pid>,
    pub elected: bool,
    /// Seconds since the epoch.
    pub start_time: u64,
    pub elected_time: Option<u64>,
    pub frameworks: Vec<FrameworkSummary>,
    pub agents: Vec<AgentSummary>,
    pub outstanding_offers: usize,
    pub attached_files: Vec<String>,
}
