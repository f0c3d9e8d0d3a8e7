//! ZooKeeper-backed detection.
//!
//! # Responsibilities
//! - Keep a session to the ensemble, reconnecting with backoff
//! - Contend by creating an ephemeral sequential `info_` member holding the pid
//! - Watch the group and report the lowest-sequence member as leader
//!
//! # Design Decisions
//! - A lost session reports "no leader" before reconnecting; a leading master
//!   treats that as demotion
//! - A fresh session creates a fresh member; the old one expires server-side

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::detector::{MasterDetector, ZkUrl};
use crate::master::{MasterClient, Pid};
use crate::resilience::backoff::reconnect_delay;
use crate::zookeeper::proto::{code, Acl, CreateMode};
use crate::zookeeper::{ZkError, ZkSession};

/// Name prefix of group members.
pub const MEMBER_PREFIX: &str = "info_";

const RECONNECT_BASE: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct ZooKeeperDetector {
    url: ZkUrl,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ZooKeeperDetector {
    /// Start the membership task; connection happens in the background.
    pub fn create(
        url: ZkUrl,
        master: MasterClient,
        contend: bool,
        quiet: bool,
        session_timeout: Duration,
    ) -> Self {
        tracing::info!(url = %url, contend, "Starting ZooKeeper master detector");

        let (shutdown, shutdown_rx) = oneshot::channel();
        let group = Group {
            url: url.clone(),
            master,
            contend,
            quiet,
            session_timeout,
        };
        let task = tokio::spawn(group.run(shutdown_rx));

        Self {
            url,
            shutdown,
            task,
        }
    }
}

impl MasterDetector for ZooKeeperDetector {
    fn kind(&self) -> &'static str {
        "zookeeper"
    }

    async fn destroy(self) {
        let Self {
            url,
            shutdown,
            task,
        } = self;
        let _ = shutdown.send(());
        if let Err(e) = task.await {
            tracing::warn!(url = %url, error = %e, "ZooKeeper detector task failed");
        }
        tracing::debug!(url = %url, "ZooKeeper detector destroyed");
    }
}

struct Group {
    url: ZkUrl,
    master: MasterClient,
    contend: bool,
    quiet: bool,
    session_timeout: Duration,
}

impl Group {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut attempt = 0u32;
        let mut reported: Option<Option<Pid>> = None;

        loop {
            let server = &self.url.servers[attempt as usize % self.url.servers.len()];
            match self
                .session(server, &mut shutdown, &mut reported, &mut attempt)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(server = %server, error = %e, "ZooKeeper session failed");
                    self.report(&mut reported, None);

                    attempt = attempt.saturating_add(1);
                    let delay = reconnect_delay(attempt, RECONNECT_BASE, self.session_timeout);
                    tokio::select! {
                        _ = &mut shutdown => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One session lifetime. `Ok` means shutdown was requested.
    async fn session(
        &self,
        server: &str,
        shutdown: &mut oneshot::Receiver<()>,
        reported: &mut Option<Option<Pid>>,
        attempt: &mut u32,
    ) -> Result<(), ZkError> {
        let mut session = tokio::select! {
            _ = &mut *shutdown => return Ok(()),
            session = ZkSession::connect(server, self.session_timeout) => session?,
        };
        *attempt = 0;

        if self.quiet {
            tracing::debug!(
                server = %server,
                session_id = session.session_id(),
                "ZooKeeper session established"
            );
        } else {
            tracing::info!(
                server = %server,
                session_id = session.session_id(),
                timeout_ms = session.timeout().as_millis() as u64,
                "ZooKeeper session established"
            );
        }

        // A stalled ensemble must not hold up teardown. Dropping the session
        // mid-request lets the server expire it.
        tokio::select! {
            _ = &mut *shutdown => {
                tracing::debug!(server = %server, "Shutdown while joining master group");
                return Ok(());
            }
            joined = self.join(&mut session) => joined?,
        }

        loop {
            let leader = self.current_leader(&mut session).await?;
            self.report(reported, leader);

            let event = tokio::select! {
                _ = &mut *shutdown => None,
                event = session.next_event() => Some(event?),
            };

            match event {
                Some(event) => {
                    tracing::debug!(path = %event.path, kind = event.kind, "Master group changed")
                }
                None => {
                    if let Err(e) = session.close().await {
                        tracing::debug!(error = %e, "Failed to close ZooKeeper session cleanly");
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Authenticate, create the group path and, when contending, the member.
    async fn join(&self, session: &mut ZkSession) -> Result<(), ZkError> {
        let acl = match &self.url.credentials {
            Some(credentials) => {
                session.authenticate("digest", credentials.digest()).await?;
                Acl::creator_all()
            }
            None => Acl::open(),
        };

        session.ensure_path(&self.url.path, &acl).await?;

        if self.contend {
            let member = session
                .create(
                    &format!("{}/{}", self.url.path, MEMBER_PREFIX),
                    self.master.pid().to_string().into_bytes(),
                    acl,
                    CreateMode::EphemeralSequential,
                )
                .await?;
            tracing::info!(member = %member, "Joined master group");
        }
        Ok(())
    }

    async fn current_leader(&self, session: &mut ZkSession) -> Result<Option<Pid>, ZkError> {
        let children = session.get_children(&self.url.path, true).await?;
        let Some(member) = leader_of(&children) else {
            return Ok(None);
        };

        let path = format!("{}/{}", self.url.path, member);
        let data = match session.get_data(&path, false).await {
            Ok(data) => data,
            // Gone between listing and reading; the children watch will fire.
            Err(ZkError::Server(code::NO_NODE)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let text = String::from_utf8_lossy(&data);
        match text.trim().parse::<Pid>() {
            Ok(pid) => Ok(Some(pid)),
            Err(e) => {
                tracing::warn!(member = %path, error = %e, "Leading member holds an invalid pid");
                Ok(None)
            }
        }
    }

    fn report(&self, reported: &mut Option<Option<Pid>>, leader: Option<Pid>) {
        if reported.as_ref() == Some(&leader) {
            return;
        }
        match &leader {
            Some(pid) => tracing::info!(leader = %pid, "Detected leading master"),
            None => tracing::warn!("No leading master detected"),
        }
        self.master.leader_detected(leader.clone());
        *reported = Some(leader);
    }
}

/// The member with the lowest sequence number.
pub fn leader_of(children: &[String]) -> Option<&str> {
    children
        .iter()
        .filter_map(|child| {
            let sequence = child.strip_prefix(MEMBER_PREFIX)?.parse::<u64>().ok()?;
            Some((sequence, child.as_str()))
        })
        .min_by_key(|(sequence, _)| *sequence)
        .map(|(_, child)| child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_sequence_leads() {
        let children = vec![
            "info_0000000012".to_string(),
            "info_0000000003".to_string(),
            "info_0000000007".to_string(),
        ];
        assert_eq!(leader_of(&children), Some("info_0000000003"));
    }

    #[test]
    fn test_foreign_children_are_ignored() {
        let children = vec!["log_replicas".to_string(), "info_x".to_string()];
        assert_eq!(leader_of(&children), None);
        assert_eq!(leader_of(&[]), None);
    }
}
