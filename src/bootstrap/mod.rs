//! Startup orchestration.
//!
//! # Data Flow
//! ```text
//! MasterConfig + ProcessRuntime
//!     → Bootstrap::start
//!         allocator::spawn(HierarchicalDrfPolicy)
//!         FileRegistry (+ --log_dir as /master/log)
//!         Master::spawn(pid)
//!         HttpServer on the runtime listener
//!         DetectorFactory::create(--zk, master, contend)
//!     → Running::wait
//!         master terminates
//!         → drop allocator handle → join allocator policy
//!         → destroy detector → stop HTTP
//! ```
//!
//! # Design Decisions
//! - Subsystems start in order, not concurrently; any failure before the
//!   master runs is returned, never retried
//! - Everything started is owned here and released in reverse dependency
//!   order, on the normal and the failure path alike

mod run;

pub use run::{finish, run, start, ExitStatus};

use metrics_exporter_prometheus::PrometheusHandle;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::allocator::{self, Allocator, AllocatorProcess, HierarchicalDrfPolicy};
use crate::config::MasterConfig;
use crate::detector::{DetectorError, DetectorFactory, MasterDetector};
use crate::files::FileRegistry;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::master::{Master, MasterClient, MasterHandle, Pid, Termination};
use crate::runtime::{ProcessRuntime, RuntimeError};

/// Actor id of the master within the process.
pub const MASTER_ID: &str = "master";

/// Virtual path the log directory is attached under.
pub const LOG_DIR_NAME: &str = "/master/log";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to initialize the process runtime: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Failed to create a master detector: {0}")]
    Detector(#[from] DetectorError),
}

/// One step of teardown, in the order performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    MasterStopped,
    AllocatorReleased,
    AllocatorPolicyReleased,
    DetectorDestroyed,
    HttpStopped,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            TeardownStage::MasterStopped => "master",
            TeardownStage::AllocatorReleased => "allocator",
            TeardownStage::AllocatorPolicyReleased => "allocator-policy",
            TeardownStage::DetectorDestroyed => "detector",
            TeardownStage::HttpStopped => "http",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub termination: Termination,
    pub stages: Vec<TeardownStage>,
}

/// Builds the master's object graph from a validated configuration.
pub struct Bootstrap<F> {
    config: MasterConfig,
    factory: F,
    metrics: Option<PrometheusHandle>,
}

impl<F: DetectorFactory> Bootstrap<F> {
    pub fn new(config: MasterConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Start every subsystem, ending with leader detection.
    ///
    /// On detector failure everything already started is released before the
    /// error is returned.
    pub async fn start(
        self,
        runtime: ProcessRuntime,
    ) -> Result<Running<F::Detector>, BootstrapError> {
        let Self {
            config,
            factory,
            metrics,
        } = self;

        let (allocator_process, allocator) = allocator::spawn(HierarchicalDrfPolicy::new());
        tracing::info!(policy = allocator_process.policy_name(), "Allocator started");

        let files = Arc::new(FileRegistry::new());
        if let Some(dir) = &config.log_dir {
            if let Err(e) = files.attach(dir, LOG_DIR_NAME) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to attach log directory");
            }
        }

        let shutdown = Shutdown::new();
        let local_addr = runtime.local_addr();
        let pid = Pid::new(MASTER_ID, runtime.advertised_addr());

        // Declared after the allocator so an early return drops the master first.
        let master =
            Master::new(allocator.clone(), files.clone(), config.clone()).spawn(pid.clone());

        let server = HttpServer::new(AppState {
            master: master.client(),
            files: files.clone(),
            metrics,
        });
        let http = tokio::spawn(server.run(runtime.into_listener(), shutdown.subscribe()));

        tracing::info!(pid = %pid, zk = %config.zk, "Creating master detector");
        let detector = factory.create(&config.zk, &master.client(), true, config.quiet)?;
        tracing::info!(kind = detector.kind(), "Master detector created");

        Ok(Running {
            pid,
            local_addr,
            master,
            allocator,
            allocator_process,
            detector,
            files,
            shutdown,
            http,
        })
    }
}

/// A started master and everything it depends on.
pub struct Running<D> {
    pid: Pid,
    local_addr: SocketAddr,
    master: MasterHandle,
    allocator: Allocator,
    allocator_process: AllocatorProcess,
    detector: D,
    files: Arc<FileRegistry>,
    shutdown: Shutdown,
    http: JoinHandle<Result<(), std::io::Error>>,
}

impl<D: MasterDetector> Running<D> {
    pub fn master(&self) -> MasterClient {
        self.master.client()
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn files(&self) -> &Arc<FileRegistry> {
        &self.files
    }

    /// Block until the master terminates, then tear everything down.
    pub async fn wait(self) -> TeardownReport {
        let Running {
            pid,
            master,
            allocator,
            allocator_process,
            detector,
            shutdown,
            http,
            ..
        } = self;
        let mut stages = Vec::with_capacity(5);

        let termination = master.wait().await;
        tracing::info!(pid = %pid, reason = ?termination, "Master terminated");
        stages.push(TeardownStage::MasterStopped);

        drop(allocator);
        stages.push(TeardownStage::AllocatorReleased);

        if let Err(e) = allocator_process.join().await {
            tracing::error!(error = %e, "Allocator did not stop cleanly");
        }
        stages.push(TeardownStage::AllocatorPolicyReleased);

        let kind = detector.kind();
        detector.destroy().await;
        tracing::debug!(kind, "Master detector destroyed");
        stages.push(TeardownStage::DetectorDestroyed);

        shutdown.trigger();
        match http.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
            Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        }
        stages.push(TeardownStage::HttpStopped);

        let order: Vec<String> = stages.iter().map(ToString::to_string).collect();
        tracing::info!(stages = %order.join(" -> "), "Teardown complete");

        TeardownReport { termination, stages }
    }
}
