//! Subscriber setup for diagnostic logs and the agent trace.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Overrides `logging.level` when set.
pub const LOG_LEVEL_ENV: &str = "NOVA_ACT_LOG_LEVEL";

/// Filter directive in effect: the environment override if set, else the
/// configured level.
pub fn resolve_filter(config: &LoggingConfig, env_override: Option<String>) -> String {
    env_override
        .map(|level| level.trim().to_string())
        .filter(|level| !level.is_empty())
        .unwrap_or_else(|| config.level.clone())
}

/// Levels above `info` hide the trace, so the progress dots go too.
pub fn is_quiet(config: &LoggingConfig, filter: &str) -> bool {
    config.quiet || matches!(filter.to_ascii_lowercase().as_str(), "warn" | "error" | "off")
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed, in which case the
/// existing one is kept.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = resolve_filter(config, std::env::var(LOG_LEVEL_ENV).ok());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_wins() {
        let config = LoggingConfig::default();
        assert_eq!(resolve_filter(&config, Some("debug".to_string())), "debug");
        assert_eq!(resolve_filter(&config, Some("  ".to_string())), "info");
        assert_eq!(resolve_filter(&config, None), "info");
    }

    #[test]
    fn test_quiet_levels() {
        let config = LoggingConfig::default();
        assert!(!is_quiet(&config, "info"));
        assert!(is_quiet(&config, "WARN"));
        assert!(is_quiet(
            &LoggingConfig {
                quiet: true,
                ..LoggingConfig::default()
            },
            "debug"
        ));
    }

    #[test]
    fn test_second_init_keeps_existing_subscriber() {
        let config = LoggingConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
