//! Command-line flag definitions.

use clap::{ArgAction, CommandFactory, Parser};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::config::schema::LogLevel;

/// Default port the master listens on.
pub const DEFAULT_PORT: u16 = 5050;

/// Raw flags as parsed from the command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "cluster-master")]
#[command(about = "Resource-offer cluster master", long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
#[command(args_override_self = true)]
pub struct MasterFlags {
    /// IP address to listen on
    #[arg(long)]
    pub ip: Option<IpAddr>,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// ZooKeeper URL (used for leader election amongst masters)
    /// May be one of:
    ///   zk://host1:port1,host2:port2,.../path
    ///   zk://username:password@host1:port1,host2:port2,.../path
    ///   file://path/to/file (where file contains one of the above)
    #[arg(long, default_value = "", verbatim_doc_comment)]
    pub zk: String,

    /// Disable logging below warnings to stderr
    #[arg(long, action = ArgAction::SetTrue)]
    pub quiet: bool,

    /// Minimum level of log events to emit
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub logging_level: LogLevel,

    /// Directory of log files exposed under /master/log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Seconds between batch allocations
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub allocation_interval: u64,

    /// ZooKeeper session timeout in seconds
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub zk_session_timeout: u64,

    /// Prints this help message
    #[arg(long, action = ArgAction::SetTrue)]
    pub help: bool,
}

/// Render the usage text printed on `--help` and on load errors.
pub fn usage(argv0: &str) -> String {
    let program = Path::new(argv0)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(argv0);

    let mut command = MasterFlags::command().help_template("{options}");
    format!(
        "Usage: {program} [...]\n\nSupported options:\n{}",
        command.render_help()
    )
}
