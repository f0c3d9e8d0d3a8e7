//! Structured logging.
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the command line so operators can narrow output
//!   without touching the flags
//! - Installation is idempotent; a second call (tests, embedding) is a no-op

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::MasterConfig;

/// Directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &MasterConfig) -> String {
    let level = if config.quiet {
        "warn"
    } else {
        config.logging_level.as_directive()
    };
    format!("{},tower_http={}", level, level)
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init(config: &MasterConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_quiet_overrides_level() {
        let config = MasterConfig {
            quiet: true,
            logging_level: LogLevel::Debug,
            ..MasterConfig::default()
        };
        assert_eq!(default_directive(&config), "warn,tower_http=warn");
    }

    #[test]
    fn test_level_from_flags() {
        let config = MasterConfig {
            logging_level: LogLevel::Trace,
            ..MasterConfig::default()
        };
        assert_eq!(default_directive(&config), "trace,tower_http=trace");
    }
}
