//! The master process.
//!
//! # Data Flow
//! ```text
//! detector ── leader_detected(Some(pid)) ──▶ MasterProcess (actor task)
//! http / schedulers ── MasterClient ──▶        │ frameworks, agents, offers
//!                                              │ every allocation_interval while leading:
//!                                              ▼
//!                                         Allocator::allocate → offers
//! ```
//!
//! # Design Decisions
//! - Only the leading master accepts registrations; standbys answer `NotLeader`
//! - Losing leadership terminates the loop; a restarted process rejoins the election
//! - `MasterHandle` owns the task and aborts it when dropped unwaited

mod client;
mod pid;
mod process;
mod types;

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::allocator::Allocator;
use crate::config::MasterConfig;
use crate::files::FileRegistry;

pub use client::MasterClient;
pub use pid::{Pid, PidParseError};
pub use types::{
    AgentInfo, AgentSummary, FrameworkInfo, FrameworkSummary, MasterError, MasterState, Offer,
    Termination, DEFAULT_ROLE,
};

use process::MasterProcess;

/// A master that has not been started yet.
pub struct Master {
    allocator: Allocator,
    files: Arc<FileRegistry>,
    config: MasterConfig,
}

impl Master {
    pub fn new(allocator: Allocator, files: Arc<FileRegistry>, config: MasterConfig) -> Self {
        Self {
            allocator,
            files,
            config,
        }
    }

    /// Start the actor under `pid`.
    pub fn spawn(self, pid: Pid) -> MasterHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let leader = Arc::new(ArcSwapOption::empty());
        let client = MasterClient::new(pid.clone(), tx, leader.clone());

        let process =
            MasterProcess::new(pid.clone(), self.allocator, self.files, self.config, leader);
        let task = tokio::spawn(process.run(rx));

        MasterHandle {
            pid,
            client,
            task: Some(task),
        }
    }
}

/// Owner of a running master.
pub struct MasterHandle {
    pid: Pid,
    client: MasterClient,
    task: Option<JoinHandle<Termination>>,
}

impl MasterHandle {
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn client(&self) -> MasterClient {
        self.client.clone()
    }

    /// Wait for the loop to exit.
    pub async fn wait(mut self) -> Termination {
        let Some(task) = self.task.take() else {
            return Termination::Failed("master already joined".to_string());
        };
        match task.await {
            Ok(termination) => termination,
            Err(e) => Termination::Failed(e.to_string()),
        }
    }
}

impl Drop for MasterHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!(pid = %self.pid, "Aborting master");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{self, HierarchicalDrfPolicy, Resources};
    use crate::ids::{AgentId, FrameworkId};
    use std::time::Duration;

    fn start(interval: Duration) -> (allocator::AllocatorProcess, MasterHandle) {
        let (process, allocator) = allocator::spawn(HierarchicalDrfPolicy::new());
        let config = MasterConfig {
            allocation_interval: interval,
            ..MasterConfig::default()
        };
        let master = Master::new(allocator, Arc::new(FileRegistry::new()), config);
        let pid: Pid = "master@127.0.0.1:5050".parse().unwrap();
        (process, master.spawn(pid))
    }

    fn elected(interval: Duration) -> (allocator::AllocatorProcess, MasterHandle) {
        let (process, handle) = start(interval);
        let client = handle.client();
        client.leader_detected(Some(client.pid().clone()));
        (process, handle)
    }

    async fn add_agent(client: &MasterClient, hostname: &str, resources: Resources) -> AgentId {
        client
            .register_agent(AgentInfo {
                hostname: hostname.into(),
                resources,
            })
            .await
            .unwrap()
    }

    /// Poll until `framework_id` holds `count` offers.
    async fn wait_for_offers(
        client: &MasterClient,
        framework_id: &FrameworkId,
        count: usize,
    ) -> Vec<Offer> {
        let mut offers = Vec::new();
        for _ in 0..100 {
            offers = client.offers(framework_id.clone()).await.unwrap();
            if offers.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(offers.len(), count, "offers: {offers:?}");
        offers
    }

    #[tokio::test]
    async fn test_standby_rejects_registration() {
        let (_allocator, handle) = start(Duration::from_secs(60));
        let client = handle.client();

        let err = client
            .register_framework(FrameworkInfo::new("spark"))
            .await
            .unwrap_err();
        assert!(matches!(err, MasterError::NotLeader { leader: None }));
        assert!(!client.is_leading());
    }

    #[tokio::test]
    async fn test_elected_master_sends_offers() {
        let (_allocator, handle) = elected(Duration::from_millis(20));
        let client = handle.client();

        let framework_id = client
            .register_framework(FrameworkInfo::new("spark"))
            .await
            .unwrap();
        add_agent(&client, "agent-1", Resources::new(4.0, 4096.0, 0.0)).await;

        let offers = wait_for_offers(&client, &framework_id, 1).await;
        assert_eq!(offers[0].resources, Resources::new(4.0, 4096.0, 0.0));

        client
            .accept_offer(offers[0].id.clone(), Resources::new(1.0, 1024.0, 0.0))
            .await
            .unwrap();
        let state = client.state().await.unwrap();
        assert!(state.elected);
        assert_eq!(state.frameworks.len(), 1);
        assert_eq!(state.agents.len(), 1);
    }

    #[tokio::test]
    async fn test_accept_more_than_offered_is_rejected() {
        let (_allocator, handle) = elected(Duration::from_millis(20));
        let client = handle.client();

        let framework_id = client
            .register_framework(FrameworkInfo::new("web"))
            .await
            .unwrap();
        add_agent(&client, "agent-1", Resources::new(1.0, 512.0, 0.0)).await;

        let offers = wait_for_offers(&client, &framework_id, 1).await;
        let err = client
            .accept_offer(offers[0].id.clone(), Resources::new(2.0, 0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, MasterError::InsufficientResources(_)));
    }

    #[tokio::test]
    async fn test_declined_offer_is_offered_again() {
        let (_allocator, handle) = elected(Duration::from_millis(20));
        let client = handle.client();

        let framework_id = client
            .register_framework(FrameworkInfo::new("batch"))
            .await
            .unwrap();
        add_agent(&client, "agent-1", Resources::new(4.0, 400.0, 0.0)).await;

        let first = wait_for_offers(&client, &framework_id, 1).await;
        client.decline_offer(first[0].id.clone()).await.unwrap();

        let second = wait_for_offers(&client, &framework_id, 1).await;
        assert_ne!(second[0].id, first[0].id);
        assert_eq!(second[0].resources, Resources::new(4.0, 400.0, 0.0));

        let err = client.decline_offer(first[0].id.clone()).await.unwrap_err();
        assert!(matches!(err, MasterError::UnknownOffer(_)));
    }

    #[tokio::test]
    async fn test_partial_accept_offers_remainder() {
        let (_allocator, handle) = elected(Duration::from_millis(20));
        let client = handle.client();

        let framework_id = client
            .register_framework(FrameworkInfo::new("batch"))
            .await
            .unwrap();
        add_agent(&client, "agent-1", Resources::new(4.0, 400.0, 0.0)).await;

        let first = wait_for_offers(&client, &framework_id, 1).await;
        client
            .accept_offer(first[0].id.clone(), Resources::new(1.0, 100.0, 0.0))
            .await
            .unwrap();

        let remainder = wait_for_offers(&client, &framework_id, 1).await;
        assert_ne!(remainder[0].id, first[0].id);
        assert_eq!(remainder[0].resources, Resources::new(3.0, 300.0, 0.0));
    }

    #[tokio::test]
    async fn test_unregister_rescinds_offers_and_frees_resources() {
        let (_allocator, handle) = elected(Duration::from_millis(20));
        let client = handle.client();

        let first = client
            .register_framework(FrameworkInfo::new("etl").with_role("analytics"))
            .await
            .unwrap();
        add_agent(&client, "agent-1", Resources::new(4.0, 400.0, 0.0)).await;
        let rescinded = wait_for_offers(&client, &first, 1).await;

        let second = client
            .register_framework(FrameworkInfo::new("web"))
            .await
            .unwrap();
        let state = client.state().await.unwrap();
        let etl = state.frameworks.iter().find(|f| f.id == first).unwrap();
        assert_eq!(etl.role, "analytics");

        client.unregister_framework(first.clone()).await.unwrap();
        assert!(matches!(
            client.offers(first.clone()).await,
            Err(MasterError::UnknownFramework(_))
        ));
        assert!(matches!(
            client.accept_offer(rescinded[0].id.clone(), Resources::default()).await,
            Err(MasterError::UnknownOffer(_))
        ));

        let offers = wait_for_offers(&client, &second, 1).await;
        assert_eq!(offers[0].resources, Resources::new(4.0, 400.0, 0.0));
        assert_eq!(client.state().await.unwrap().outstanding_offers, 1);

        let err = client.unregister_framework(first).await.unwrap_err();
        assert!(matches!(err, MasterError::UnknownFramework(_)));
    }

    #[tokio::test]
    async fn test_removed_agent_offers_are_dropped() {
        let (_allocator, handle) = elected(Duration::from_millis(20));
        let client = handle.client();

        let framework_id = client
            .register_framework(FrameworkInfo::new("batch"))
            .await
            .unwrap();
        let gone = add_agent(&client, "agent-1", Resources::new(2.0, 200.0, 0.0)).await;
        let kept = add_agent(&client, "agent-2", Resources::new(4.0, 400.0, 0.0)).await;

        let offers = wait_for_offers(&client, &framework_id, 2).await;
        let dropped = offers.iter().find(|o| o.agent_id == gone).unwrap().id.clone();

        client.remove_agent(gone.clone()).await.unwrap();

        let offers = client.offers(framework_id).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].agent_id, kept);
        assert!(matches!(
            client.decline_offer(dropped).await,
            Err(MasterError::UnknownOffer(_))
        ));

        let state = client.state().await.unwrap();
        assert_eq!(state.agents.len(), 1);
        assert!(matches!(
            client.remove_agent(gone).await,
            Err(MasterError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_lost_leadership_terminates() {
        let (_allocator, handle) = start(Duration::from_secs(60));
        let client = handle.client();

        client.leader_detected(Some(client.pid().clone()));
        let other: Pid = "master@10.0.0.9:5050".parse().unwrap();
        client.leader_detected(Some(other));

        assert_eq!(handle.wait().await, Termination::LostLeadership);
        assert!(client.leader().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_request() {
        let (_allocator, handle) = start(Duration::from_secs(60));
        handle.client().shutdown();
        assert_eq!(handle.wait().await, Termination::Shutdown);
    }

    #[tokio::test]
    async fn test_dropped_handle_aborts_master() {
        let (_allocator, handle) = start(Duration::from_secs(60));
        let client = handle.client();
        drop(handle);

        for _ in 0..50 {
            if !client.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!client.is_running());
    }
}
