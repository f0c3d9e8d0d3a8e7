use std::ffi::OsString;
use std::process::ExitCode;

use crate::bootstrap::{Bootstrap, BootstrapError, Running, MASTER_ID};
use crate::config::{self, LoadOutcome, ENV_NAMESPACE};
use crate::detector::{DefaultDetectorFactory, Detector};
use crate::master::Termination;
use crate::observability::{logging, metrics};
use crate::runtime;

/// How the daemon should leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The master terminated; teardown completed.
    Success,
    /// Help was requested or the flags were invalid; usage was printed.
    Usage,
    /// Startup failed after resources were created. The binary aborts.
    Fatal,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::SUCCESS,
            ExitStatus::Usage | ExitStatus::Fatal => ExitCode::FAILURE,
        }
    }
}

/// Run the master daemon with `args` (program name first).
pub async fn run<I, T>(args: I) -> ExitStatus
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    match start(args).await {
        Ok(running) => finish(running).await,
        Err(status) => status,
    }
}

/// Everything up to a running master. Nothing is constructed when the flags
/// ask for help or fail to load.
pub async fn start<I, T>(args: I) -> Result<Running<Detector>, ExitStatus>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let argv0 = args
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let config = match config::load(ENV_NAMESPACE, args) {
        Ok(LoadOutcome::Run(config)) => config,
        Ok(LoadOutcome::Help) => {
            eprintln!("{}", config::usage(&argv0));
            return Err(ExitStatus::Usage);
        }
        Err(e) => {
            eprintln!("{}\n\n{}", e, config::usage(&argv0));
            return Err(ExitStatus::Usage);
        }
    };

    logging::init(&config);
    runtime::configure_address(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Build: {}", env!("CARGO_PKG_NAME"));
    tracing::info!("Starting master");

    let process_runtime = runtime::initialize(MASTER_ID)
        .await
        .map_err(BootstrapError::from)
        .map_err(fatal)?;

    let factory = DefaultDetectorFactory::new(config.zk_session_timeout);
    Bootstrap::new(config, factory)
        .with_metrics(metrics::init_recorder())
        .start(process_runtime)
        .await
        .map_err(fatal)
}

/// Block until the master terminates and map its reason to an exit status.
pub async fn finish(running: Running<Detector>) -> ExitStatus {
    let report = running.wait().await;
    exit_status(&report.termination)
}

fn fatal(e: BootstrapError) -> ExitStatus {
    tracing::error!(error = %e, "Failed to start master");
    ExitStatus::Fatal
}

fn exit_status(termination: &Termination) -> ExitStatus {
    match termination {
        Termination::Failed(reason) => {
            tracing::error!(reason = %reason, "Master failed");
            ExitStatus::Fatal
        }
        Termination::Shutdown | Termination::LostLeadership | Termination::MailboxClosed => {
            ExitStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_master_is_fatal() {
        let status = exit_status(&Termination::Failed("task panicked".to_string()));
        assert_eq!(status, ExitStatus::Fatal);
    }

    #[test]
    fn test_orderly_termination_succeeds() {
        for termination in [
            Termination::Shutdown,
            Termination::LostLeadership,
            Termination::MailboxClosed,
        ] {
            assert_eq!(exit_status(&termination), ExitStatus::Success);
        }
    }
}
