//! Validated master configuration.

use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::flags::DEFAULT_PORT;
use crate::detector::DetectorEndpoint;

/// Verbosity accepted by `--logging_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

/// Master configuration, immutable once loaded.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Address override for the runtime listener.
    pub ip: Option<IpAddr>,

    /// Port for the runtime listener (0 = ephemeral).
    pub port: u16,

    /// Leader-election endpoint; `Standalone` when `--zk` is empty.
    pub zk: DetectorEndpoint,

    /// Only warnings and errors reach stderr.
    pub quiet: bool,

    pub logging_level: LogLevel,

    /// Directory attached to the file registry as `/master/log`.
    pub log_dir: Option<PathBuf>,

    /// Period of the master's batch allocation.
    pub allocation_interval: Duration,

    /// ZooKeeper session timeout.
    pub zk_session_timeout: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            ip: None,
            port: DEFAULT_PORT,
            zk: DetectorEndpoint::Standalone,
            quiet: false,
            logging_level: LogLevel::Info,
            log_dir: None,
            allocation_interval: Duration::from_secs(1),
            zk_session_timeout: Duration::from_secs(10),
        }
    }
}
