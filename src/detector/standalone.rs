//! Standalone detection: no coordination service, the local master leads.

use crate::detector::MasterDetector;
use crate::master::{MasterClient, Pid};

#[derive(Debug)]
pub struct StandaloneDetector {
    leader: Option<Pid>,
}

impl StandaloneDetector {
    /// Appoint `master` as leader when contending; otherwise no leader is known.
    pub fn create(master: &MasterClient, contend: bool) -> Self {
        let leader = contend.then(|| master.pid().clone());
        match &leader {
            Some(pid) => tracing::info!(leader = %pid, "Standalone mode, appointing local master"),
            None => tracing::info!("Standalone mode without contention, no leader"),
        }
        master.leader_detected(leader.clone());
        Self { leader }
    }
}

impl MasterDetector for StandaloneDetector {
    fn kind(&self) -> &'static str {
        "standalone"
    }

    async fn destroy(self) {
        tracing::debug!(
            leader = ?self.leader.map(|pid| pid.to_string()),
            "Standalone detector destroyed"
        );
    }
}
