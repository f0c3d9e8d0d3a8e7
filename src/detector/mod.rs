//! Leader detection subsystem.
//!
//! # Data Flow
//! ```text
//! --zk value
//!     → endpoint.rs (parse: standalone | zk:// | file://)
//!     → DetectorFactory::create (after the master is spawned)
//!         - standalone.rs: appoint the local master
//!         - zookeeper.rs: contend in the group, watch for the leader
//!     → MasterClient::leader_detected(Option<Pid>)
//! ```
//!
//! # Design Decisions
//! - The orchestrator never looks inside the endpoint; every form goes
//!   through the same `create` call
//! - Creation is fallible and the caller treats failure as fatal
//! - A detector is destroyed explicitly, after the master has stopped

pub mod endpoint;
pub mod standalone;
pub mod zookeeper;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::master::MasterClient;

pub use endpoint::{Credentials, DetectorEndpoint, EndpointError, ZkUrl};
pub use standalone::StandaloneDetector;
pub use zookeeper::ZooKeeperDetector;

/// Errors raised while creating a detector.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Failed to resolve leader-election endpoint: {0}")]
    Endpoint(#[from] EndpointError),
}

/// An active leader-election session.
pub trait MasterDetector: Send + 'static {
    /// Name of the backing mechanism, for logs.
    fn kind(&self) -> &'static str;

    /// Leave the election and release the session.
    fn destroy(self) -> impl Future<Output = ()> + Send;
}

/// Creates detectors bound to a master's identity.
pub trait DetectorFactory {
    type Detector: MasterDetector;

    /// `contend` enters the election with the master's pid; `quiet` lowers
    /// the verbosity of session chatter.
    fn create(
        &self,
        endpoint: &DetectorEndpoint,
        master: &MasterClient,
        contend: bool,
        quiet: bool,
    ) -> Result<Self::Detector, DetectorError>;
}

/// Factory used by the daemon: dispatches on the endpoint form.
#[derive(Debug, Clone)]
pub struct DefaultDetectorFactory {
    session_timeout: Duration,
}

impl DefaultDetectorFactory {
    pub fn new(session_timeout: Duration) -> Self {
        Self { session_timeout }
    }
}

/// Detector produced by [`DefaultDetectorFactory`].
#[derive(Debug)]
pub enum Detector {
    Standalone(StandaloneDetector),
    ZooKeeper(ZooKeeperDetector),
}

impl MasterDetector for Detector {
    fn kind(&self) -> &'static str {
        match self {
            Detector::Standalone(d) => d.kind(),
            Detector::ZooKeeper(d) => d.kind(),
        }
    }

    async fn destroy(self) {
        match self {
            Detector::Standalone(d) => d.destroy().await,
            Detector::ZooKeeper(d) => d.destroy().await,
        }
    }
}

impl DetectorFactory for DefaultDetectorFactory {
    type Detector = Detector;

    fn create(
        &self,
        endpoint: &DetectorEndpoint,
        master: &MasterClient,
        contend: bool,
        quiet: bool,
    ) -> Result<Detector, DetectorError> {
        match endpoint.resolve()? {
            None => Ok(Detector::Standalone(StandaloneDetector::create(master, contend))),
            Some(url) => Ok(Detector::ZooKeeper(ZooKeeperDetector::create(
                url,
                master.clone(),
                contend,
                quiet,
                self.session_timeout,
            ))),
        }
    }
}
