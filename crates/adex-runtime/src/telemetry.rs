//! Logging initialisation

use tracing_subscriber::EnvFilter;

use adex_core::{AdexError, AdexResult};

use crate::LogConfig;

/// Install the global `tracing` subscriber.
///
/// Returns `false` when a subscriber was already installed, which is
/// not an error: tests and embedding hosts may have set their own.
pub fn init_logging(config: &LogConfig) -> AdexResult<bool> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| AdexError::InvalidConfig(format!("log filter {:?}: {e}", config.filter)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(filter = %config.filter, json = config.json, "logging initialised");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LogConfig::default();
        let first = init_logging(&config).unwrap();
        let second = init_logging(&config).unwrap();
        // Whoever came first owns the global subscriber
        assert!(!second || !first);
    }

    #[test]
    fn test_bad_filter_is_rejected() {
        let config = LogConfig {
            filter: "adex_exchange=notalevel".into(),
            json: false,
        };
        assert!(matches!(
            init_logging(&config),
            Err(AdexError::InvalidConfig(_))
        ));
    }
}
