//! In-process handle for talking to the master actor.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::allocator::Resources;
use crate::ids::{AgentId, FrameworkId, OfferId};
use crate::master::types::{AgentInfo, FrameworkInfo, MasterError, MasterState, Offer};
use crate::master::Pid;

type Reply<T> = oneshot::Sender<Result<T, MasterError>>;

pub(crate) enum MasterMessage {
    RegisterFramework {
        info: FrameworkInfo,
        reply: Reply<FrameworkId>,
    },
    UnregisterFramework {
        framework_id: FrameworkId,
        reply: Reply<()>,
    },
    RegisterAgent {
        info: AgentInfo,
        reply: Reply<AgentId>,
    },
    RemoveAgent {
        agent_id: AgentId,
        reply: Reply<()>,
    },
    Offers {
        framework_id: FrameworkId,
        reply: Reply<Vec<Offer>>,
    },
    AcceptOffer {
        offer_id: OfferId,
        used: Resources,
        reply: Reply<()>,
    },
    DeclineOffer {
        offer_id: OfferId,
        reply: Reply<()>,
    },
    State {
        reply: oneshot::Sender<MasterState>,
    },
    LeaderDetected {
        leader: Option<Pid>,
    },
    Shutdown,
}

/// Cloneable client bound to one master; carries the master's [`Pid`].
#[derive(Clone)]
pub struct MasterClient {
    pid: Pid,
    tx: mpsc::UnboundedSender<MasterMessage>,
    leader: Arc<ArcSwapOption<Pid>>,
}

impl std::fmt::Debug for MasterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterClient").field("pid", &self.pid).finish()
    }
}

impl MasterClient {
    pub(crate) fn new(
        pid: Pid,
        tx: mpsc::UnboundedSender<MasterMessage>,
        leader: Arc<ArcSwapOption<Pid>>,
    ) -> Self {
        Self { pid, tx, leader }
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Leader as last acknowledged by the master; lock-free.
    pub fn leader(&self) -> Option<Pid> {
        self.leader.load_full().map(|pid| (*pid).clone())
    }

    pub fn is_leading(&self) -> bool {
        self.leader
            .load()
            .as_deref()
            .is_some_and(|leader| *leader == self.pid)
    }

    /// True while the master's loop is running.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> MasterMessage,
    ) -> Result<T, MasterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| MasterError::Terminated)?;
        rx.await.map_err(|_| MasterError::Terminated)?
    }

    pub async fn register_framework(
        &self,
        info: FrameworkInfo,
    ) -> Result<FrameworkId, MasterError> {
        self.call(|reply| MasterMessage::RegisterFramework { info, reply }).await
    }

    pub async fn unregister_framework(&self, framework_id: FrameworkId) -> Result<(), MasterError> {
        self.call(|reply| MasterMessage::UnregisterFramework { framework_id, reply })
            .await
    }

    pub async fn register_agent(&self, info: AgentInfo) -> Result<AgentId, MasterError> {
        self.call(|reply| MasterMessage::RegisterAgent { info, reply }).await
    }

    pub async fn remove_agent(&self, agent_id: AgentId) -> Result<(), MasterError> {
        self.call(|reply| MasterMessage::RemoveAgent { agent_id, reply }).await
    }

    /// Outstanding offers for a framework.
    pub async fn offers(&self, framework_id: FrameworkId) -> Result<Vec<Offer>, MasterError> {
        self.call(|reply| MasterMessage::Offers { framework_id, reply }).await
    }

    /// Accept `used` out of an offer; the remainder goes back to the allocator.
    pub async fn accept_offer(
        &self,
        offer_id: OfferId,
        used: Resources,
    ) -> Result<(), MasterError> {
        self.call(|reply| MasterMessage::AcceptOffer {
            offer_id,
            used,
            reply,
        })
        .await
    }

    pub async fn decline_offer(&self, offer_id: OfferId) -> Result<(), MasterError> {
        self.call(|reply| MasterMessage::DeclineOffer { offer_id, reply }).await
    }

    pub async fn state(&self) -> Result<MasterState, MasterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MasterMessage::State { reply })
            .map_err(|_| MasterError::Terminated)?;
        rx.await.map_err(|_| MasterError::Terminated)
    }

    /// Report the current leader; sent by detectors.
    pub fn leader_detected(&self, leader: Option<Pid>) {
        if self.tx.send(MasterMessage::LeaderDetected { leader }).is_err() {
            tracing::debug!(pid = %self.pid, "Leader update dropped, master has terminated");
        }
    }

    /// Ask the master to stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(MasterMessage::Shutdown);
    }
}
