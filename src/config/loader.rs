//! Configuration loading from arguments and the environment.

use clap::{ArgAction, CommandFactory, Parser};
use std::collections::HashMap;
use std::ffi::OsString;
use std::time::Duration;
use thiserror::Error;

use crate::config::flags::MasterFlags;
use crate::config::schema::MasterConfig;
use crate::detector::{DetectorEndpoint, EndpointError};

/// Environment namespace: `--port` may also come from `MASTER_PORT`.
pub const ENV_NAMESPACE: &str = "MASTER_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Arguments (or namespaced environment values) failed to parse.
    #[error("Failed to load flags: {0}")]
    Parse(#[from] clap::Error),

    /// A namespaced environment value was not valid UTF-8, or a boolean
    /// value was neither true nor false.
    #[error("Invalid value '{value}' for environment variable {var}")]
    Environment { var: String, value: String },

    /// The leader-election endpoint is malformed.
    #[error("Invalid --zk: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Configuration is valid; start the master.
    Run(MasterConfig),
    /// `--help` was requested; print usage and exit.
    Help,
}

/// Load configuration from `args` and the process environment.
///
/// `args` includes the program name, as produced by `std::env::args_os`.
pub fn load<I, T>(namespace: &str, args: I) -> Result<LoadOutcome, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    load_from(namespace, args, std::env::vars_os())
}

/// Load configuration from `args` and an explicit environment.
///
/// Namespaced variables are applied first so that arguments win. Variables
/// outside the namespace are never decoded, so their encoding is irrelevant.
pub fn load_from<I, T, E>(namespace: &str, args: I, env: E) -> Result<LoadOutcome, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    E: IntoIterator<Item = (OsString, OsString)>,
{
    let mut args = args.into_iter().map(Into::into);
    let program = args.next().unwrap_or_else(|| OsString::from("cluster-master"));

    let mut argv = vec![program];
    argv.extend(env_args(namespace, env)?);
    argv.extend(args);

    let flags = MasterFlags::try_parse_from(argv)?;
    if flags.help {
        return Ok(LoadOutcome::Help);
    }

    let zk = DetectorEndpoint::parse(&flags.zk)?;

    Ok(LoadOutcome::Run(MasterConfig {
        ip: flags.ip,
        port: flags.port,
        zk,
        quiet: flags.quiet,
        logging_level: flags.logging_level,
        log_dir: flags.log_dir,
        allocation_interval: Duration::from_secs(flags.allocation_interval),
        zk_session_timeout: Duration::from_secs(flags.zk_session_timeout),
    }))
}

/// Translate `<namespace><FLAG>` variables into `--flag=value` arguments.
fn env_args<E>(namespace: &str, env: E) -> Result<Vec<OsString>, ConfigError>
where
    E: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: HashMap<String, OsString> = env
        .into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value)))
        .filter(|(key, _)| key.starts_with(namespace))
        .collect();

    let command = MasterFlags::command();
    let mut args = Vec::new();

    for arg in command.get_arguments() {
        let Some(long) = arg.get_long() else {
            continue;
        };
        let var = format!("{namespace}{}", long.to_uppercase());
        let Some(value) = env.remove(&var) else {
            continue;
        };
        let value = value.into_string().map_err(|value| ConfigError::Environment {
            var: var.clone(),
            value: value.to_string_lossy().into_owned(),
        })?;

        if matches!(arg.get_action(), ArgAction::SetTrue) {
            match value.to_ascii_lowercase().as_str() {
                "true" | "1" => args.push(OsString::from(format!("--{long}"))),
                "false" | "0" => {}
                _ => return Err(ConfigError::Environment { var, value }),
            }
        } else {
            args.push(OsString::from(format!("--{long}={value}")));
        }
    }

    Ok(args)
}
