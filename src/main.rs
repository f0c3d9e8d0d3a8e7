//! Cluster master daemon.
//!
//! Parses flags (arguments over `MASTER_*` variables), binds the process
//! runtime, starts the allocator, the master, the HTTP endpoints and leader
//! detection, then blocks until the master terminates.

use std::process::ExitCode;

use cluster_master::ExitStatus;

#[tokio::main]
async fn main() -> ExitCode {
    match cluster_master::bootstrap::run(std::env::args_os()).await {
        ExitStatus::Fatal => std::process::abort(),
        status => status.into(),
    }
}
