//! Allocator actor and its handle.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::allocator::policy::{Allocation, AllocatorPolicy};
use crate::allocator::resources::Resources;
use crate::allocator::AllocatorError;
use crate::ids::{AgentId, FrameworkId};

enum AllocatorMessage {
    AddFramework {
        framework_id: FrameworkId,
        role: String,
    },
    RemoveFramework {
        framework_id: FrameworkId,
    },
    AddAgent {
        agent_id: AgentId,
        total: Resources,
    },
    RemoveAgent {
        agent_id: AgentId,
    },
    Recover {
        framework_id: FrameworkId,
        agent_id: AgentId,
        resources: Resources,
    },
    Allocate {
        reply: oneshot::Sender<Vec<Allocation>>,
    },
}

/// Start the allocator actor around `policy`.
///
/// The actor runs until every [`Allocator`] clone is dropped.
pub fn spawn<P: AllocatorPolicy>(policy: P) -> (AllocatorProcess, Allocator) {
    let (tx, rx) = mpsc::unbounded_channel();
    let name = policy.name();
    let task = tokio::spawn(run(policy, rx));

    tracing::debug!(policy = name, "Allocator process started");
    (AllocatorProcess { name, task }, Allocator { tx })
}

async fn run<P: AllocatorPolicy>(
    mut policy: P,
    mut mailbox: mpsc::UnboundedReceiver<AllocatorMessage>,
) {
    while let Some(message) = mailbox.recv().await {
        match message {
            AllocatorMessage::AddFramework { framework_id, role } => {
                policy.add_framework(framework_id, &role)
            }
            AllocatorMessage::RemoveFramework { framework_id } => {
                policy.remove_framework(&framework_id)
            }
            AllocatorMessage::AddAgent { agent_id, total } => policy.add_agent(agent_id, total),
            AllocatorMessage::RemoveAgent { agent_id } => policy.remove_agent(&agent_id),
            AllocatorMessage::Recover {
                framework_id,
                agent_id,
                resources,
            } => policy.recover(&framework_id, &agent_id, resources),
            AllocatorMessage::Allocate { reply } => {
                let _ = reply.send(policy.allocate());
            }
        }
    }
    tracing::debug!(policy = policy.name(), "Allocator mailbox closed");
}

/// The running policy. Owns the actor task.
#[derive(Debug)]
pub struct AllocatorProcess {
    name: &'static str,
    task: JoinHandle<()>,
}

impl AllocatorProcess {
    pub fn policy_name(&self) -> &'static str {
        self.name
    }

    /// Wait for the actor to exit and drop its policy.
    ///
    /// Resolves only once every [`Allocator`] handle is gone.
    pub async fn join(self) -> Result<(), AllocatorError> {
        self.task.await.map_err(AllocatorError::Join)
    }
}

/// Mailbox handle injected into the master.
#[derive(Debug, Clone)]
pub struct Allocator {
    tx: mpsc::UnboundedSender<AllocatorMessage>,
}

impl std::fmt::Debug for AllocatorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AllocatorMessage::AddFramework { .. } => "AddFramework",
            AllocatorMessage::RemoveFramework { .. } => "RemoveFramework",
            AllocatorMessage::AddAgent { .. } => "AddAgent",
            AllocatorMessage::RemoveAgent { .. } => "RemoveAgent",
            AllocatorMessage::Recover { .. } => "Recover",
            AllocatorMessage::Allocate { .. } => "Allocate",
        };
        f.write_str(name)
    }
}

impl Allocator {
    fn send(&self, message: AllocatorMessage) -> Result<(), AllocatorError> {
        self.tx.send(message).map_err(|_| AllocatorError::Closed)
    }

    pub fn add_framework(
        &self,
        framework_id: FrameworkId,
        role: &str,
    ) -> Result<(), AllocatorError> {
        self.send(AllocatorMessage::AddFramework {
            framework_id,
            role: role.to_string(),
        })
    }

    pub fn remove_framework(&self, framework_id: FrameworkId) -> Result<(), AllocatorError> {
        self.send(AllocatorMessage::RemoveFramework { framework_id })
    }

    pub fn add_agent(&self, agent_id: AgentId, total: Resources) -> Result<(), AllocatorError> {
        self.send(AllocatorMessage::AddAgent { agent_id, total })
    }

    pub fn remove_agent(&self, agent_id: AgentId) -> Result<(), AllocatorError> {
        self.send(AllocatorMessage::RemoveAgent { agent_id })
    }

    pub fn recover(
        &self,
        framework_id: FrameworkId,
        agent_id: AgentId,
        resources: Resources,
    ) -> Result<(), AllocatorError> {
        self.send(AllocatorMessage::Recover {
            framework_id,
            agent_id,
            resources,
        })
    }

    pub async fn allocate(&self) -> Result<Vec<Allocation>, AllocatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(AllocatorMessage::Allocate { reply })?;
        rx.await.map_err(|_| AllocatorError::Closed)
    }
}
