//! The master's control loop.

use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::allocator::{Allocator, Resources};
use crate::config::MasterConfig;
use crate::files::FileRegistry;
use crate::ids::{AgentId, FrameworkId, OfferId};
use crate::master::client::MasterMessage;
use crate::master::types::{
    AgentInfo, AgentSummary, FrameworkInfo, FrameworkSummary, MasterError, MasterState, Offer,
    Termination,
};
use crate::master::Pid;
use crate::observability::metrics;

struct Framework {
    info: FrameworkInfo,
}

struct Agent {
    info: AgentInfo,
}

pub(crate) struct MasterProcess {
    pid: Pid,
    allocator: Allocator,
    files: Arc<FileRegistry>,
    config: MasterConfig,
    leader: Option<Pid>,
    published: Arc<ArcSwapOption<Pid>>,
    start_time: u64,
    elected_time: Option<u64>,
    frameworks: HashMap<FrameworkId, Framework>,
    agents: HashMap<AgentId, Agent>,
    offers: HashMap<OfferId, Offer>,
}

impl MasterProcess {
    pub(crate) fn new(
        pid: Pid,
        allocator: Allocator,
        files: Arc<FileRegistry>,
        config: MasterConfig,
        published: Arc<ArcSwapOption<Pid>>,
    ) -> Self {
        Self {
            pid,
            allocator,
            files,
            config,
            leader: None,
            published,
            start_time: unix_now(),
            elected_time: None,
            frameworks: HashMap::new(),
            agents: HashMap::new(),
            offers: HashMap::new(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut mailbox: mpsc::UnboundedReceiver<MasterMessage>,
    ) -> Termination {
        tracing::info!(pid = %self.pid, "Master started");

        let mut allocation = time::interval(self.config.allocation_interval);
        allocation.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let termination = loop {
            tokio::select! {
                message = mailbox.recv() => {
                    let Some(message) = message else {
                        break Termination::MailboxClosed;
                    };
                    if let ControlFlow::Break(termination) = self.handle(message) {
                        break termination;
                    }
                }
                _ = allocation.tick() => {
                    if self.is_leading() {
                        self.allocate().await;
                    }
                }
            }
        };

        tracing::info!(pid = %self.pid, reason = ?termination, "Master terminating");
        self.published.store(None);
        metrics::set_leading(false);
        termination
    }

    fn is_leading(&self) -> bool {
        self.leader.as_ref() == Some(&self.pid)
    }

    fn ensure_leading(&self) -> Result<(), MasterError> {
        if self.is_leading() {
            Ok(())
        } else {
            Err(MasterError::NotLeader {
                leader: self.leader.clone(),
            })
        }
    }

    fn handle(&mut self, message: MasterMessage) -> ControlFlow<Termination> {
        match message {
            MasterMessage::RegisterFramework { info, reply } => {
                let _ = reply.send(self.register_framework(info));
            }
            MasterMessage::UnregisterFramework { framework_id, reply } => {
                let _ = reply.send(self.unregister_framework(framework_id));
            }
            MasterMessage::RegisterAgent { info, reply } => {
                let _ = reply.send(self.register_agent(info));
            }
            MasterMessage::RemoveAgent { agent_id, reply } => {
                let _ = reply.send(self.remove_agent(agent_id));
            }
            MasterMessage::Offers { framework_id, reply } => {
                let _ = reply.send(self.offers_for(&framework_id));
            }
            MasterMessage::AcceptOffer {
                offer_id,
                used,
                reply,
            } => {
                let _ = reply.send(self.accept_offer(offer_id, used));
            }
            MasterMessage::DeclineOffer { offer_id, reply } => {
                let _ = reply.send(self.decline_offer(offer_id));
            }
            MasterMessage::State { reply } => {
                let _ = reply.send(self.snapshot());
            }
            MasterMessage::LeaderDetected { leader } => return self.leader_detected(leader),
            MasterMessage::Shutdown => {
                tracing::info!(pid = %self.pid, "Shutdown requested");
                return ControlFlow::Break(Termination::Shutdown);
            }
        }
        ControlFlow::Continue(())
    }

    fn leader_detected(&mut self, leader: Option<Pid>) -> ControlFlow<Termination> {
        let was_leading = self.is_leading();
        if self.leader != leader {
            metrics::record_leader_change();
        }
        self.published.store(leader.clone().map(Arc::new));
        self.leader = leader;
        let leading = self.is_leading();

        match (was_leading, leading) {
            (false, true) => {
                tracing::info!(pid = %self.pid, "Elected as the leading master");
                self.elected_time = Some(unix_now());
                metrics::set_leading(true);
            }
            (true, false) => {
                tracing::error!(
                    pid = %self.pid,
                    leader = ?self.leader.as_ref().map(|p| p.to_string()),
                    "Lost leadership, terminating"
                );
                return ControlFlow::Break(Termination::LostLeadership);
            }
            (false, false) => match &self.leader {
                Some(leader) => tracing::info!(leader = %leader, "Waiting as a standby master"),
                None => tracing::warn!("No leading master, waiting"),
            },
            (true, true) => {}
        }
        ControlFlow::Continue(())
    }

    fn register_framework(&mut self, info: FrameworkInfo) -> Result<FrameworkId, MasterError> {
        self.ensure_leading()?;

        let framework_id = FrameworkId::random();
        self.allocator
            .add_framework(framework_id.clone(), &info.role)
            .map_err(|_| MasterError::Terminated)?;

        tracing::info!(
            framework_id = %framework_id,
            name = %info.name,
            role = %info.role,
            "Registered framework"
        );
        self.frameworks.insert(framework_id.clone(), Framework { info });
        metrics::set_frameworks(self.frameworks.len());
        Ok(framework_id)
    }

    fn unregister_framework(&mut self, framework_id: FrameworkId) -> Result<(), MasterError> {
        self.ensure_leading()?;
        if self.frameworks.remove(&framework_id).is_none() {
            return Err(MasterError::UnknownFramework(framework_id));
        }

        // Outstanding offers are rescinded; the allocator frees them with the framework.
        self.offers.retain(|_, offer| offer.framework_id != framework_id);
        let _ = self.allocator.remove_framework(framework_id.clone());

        tracing::info!(framework_id = %framework_id, "Unregistered framework");
        metrics::set_frameworks(self.frameworks.len());
        metrics::set_outstanding_offers(self.offers.len());
        Ok(())
    }

    fn register_agent(&mut self, info: AgentInfo) -> Result<AgentId, MasterError> {
        self.ensure_leading()?;

        let agent_id = AgentId::random();
        self.allocator
            .add_agent(agent_id.clone(), info.resources)
            .map_err(|_| MasterError::Terminated)?;

        tracing::info!(agent_id = %agent_id, hostname = %info.hostname, "Registered agent");
        self.agents.insert(agent_id.clone(), Agent { info });
        metrics::set_agents(self.agents.len());
        Ok(agent_id)
    }

    fn remove_agent(&mut self, agent_id: AgentId) -> Result<(), MasterError> {
        self.ensure_leading()?;
        if self.agents.remove(&agent_id).is_none() {
            return Err(MasterError::UnknownAgent(agent_id));
        }

        self.offers.retain(|_, offer| offer.agent_id != agent_id);
        let _ = self.allocator.remove_agent(agent_id.clone());

        tracing::info!(agent_id = %agent_id, "Removed agent");
        metrics::set_agents(self.agents.len());
        metrics::set_outstanding_offers(self.offers.len());
        Ok(())
    }

    fn offers_for(&self, framework_id: &FrameworkId) -> Result<Vec<Offer>, MasterError> {
        if !self.frameworks.contains_key(framework_id) {
            return Err(MasterError::UnknownFramework(framework_id.clone()));
        }
        let mut offers: Vec<Offer> = self
            .offers
            .values()
            .filter(|offer| offer.framework_id == *framework_id)
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(offers)
    }

    fn accept_offer(&mut self, offer_id: OfferId, used: Resources) -> Result<(), MasterError> {
        let offer = self
            .offers
            .get(&offer_id)
            .ok_or_else(|| MasterError::UnknownOffer(offer_id.clone()))?;
        if !offer.resources.contains(&used) {
            return Err(MasterError::InsufficientResources(offer_id));
        }

        let Some(offer) = self.offers.remove(&offer_id) else {
            return Err(MasterError::UnknownOffer(offer_id));
        };
        let unused = offer.resources - used;
        if !unused.is_empty() {
            let _ = self
                .allocator
                .recover(offer.framework_id.clone(), offer.agent_id.clone(), unused);
        }

        tracing::debug!(offer_id = %offer_id, framework_id = %offer.framework_id, "Offer accepted");
        metrics::record_offer_outcome("accepted");
        metrics::set_outstanding_offers(self.offers.len());
        Ok(())
    }

    fn decline_offer(&mut self, offer_id: OfferId) -> Result<(), MasterError> {
        let offer = self
            .offers
            .remove(&offer_id)
            .ok_or_else(|| MasterError::UnknownOffer(offer_id.clone()))?;
        let _ = self
            .allocator
            .recover(offer.framework_id, offer.agent_id, offer.resources);

        tracing::debug!(offer_id = %offer_id, "Offer declined");
        metrics::record_offer_outcome("declined");
        metrics::set_outstanding_offers(self.offers.len());
        Ok(())
    }

    async fn allocate(&mut self) {
        let allocations = match self.allocator.allocate().await {
            Ok(allocations) => allocations,
            Err(e) => {
                tracing::error!(error = %e, "Allocation failed");
                return;
            }
        };

        for allocation in allocations {
            // The framework may have left while the allocator was working.
            if !self.frameworks.contains_key(&allocation.framework_id) {
                let _ = self.allocator.recover(
                    allocation.framework_id,
                    allocation.agent_id,
                    allocation.resources,
                );
                continue;
            }

            let offer = Offer {
                id: OfferId::random(),
                framework_id: allocation.framework_id,
                agent_id: allocation.agent_id,
                resources: allocation.resources,
            };
            tracing::debug!(
                offer_id = %offer.id,
                framework_id = %offer.framework_id,
                agent_id = %offer.agent_id,
                "Sending offer"
            );
            metrics::record_offer_outcome("offered");
            self.offers.insert(offer.id.clone(), offer);
        }
        metrics::set_outstanding_offers(self.offers.len());
    }

    fn snapshot(&self) -> MasterState {
        let mut frameworks: Vec<FrameworkSummary> = self
            .frameworks
            .iter()
            .map(|(id, framework)| FrameworkSummary {
                id: id.clone(),
                name: framework.info.name.clone(),
                role: framework.info.role.clone(),
                offers: self.offers.values().filter(|o| o.framework_id == *id).count(),
            })
            .collect();
        frameworks.sort_by(|a, b| a.id.cmp(&b.id));

        let mut agents: Vec<AgentSummary> = self
            .agents
            .iter()
            .map(|(id, agent)| AgentSummary {
                id: id.clone(),
                hostname: agent.info.hostname.clone(),
                resources: agent.info.resources,
            })
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));

        MasterState {
            version: env!("CARGO_PKG_VERSION"),
            pid: self.pid.clone(),
            leader: self.leader.clone(),
            elected: self.is_leading(),
            start_time: self.start_time,
            elected_time: self.elected_time,
            frameworks,
            agents,
            outstanding_offers: self.offers.len(),
            attached_files: self.files.attached(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
