//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured filter. Call once at startup.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let env_filter = resolve_filter(std::env::var("RUST_LOG").ok(), &config.filter)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    Ok(())
}

fn resolve_filter(env: Option<String>, fallback: &str) -> Result<EnvFilter, TelemetryError> {
    let filter = env
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());
    EnvFilter::try_new(&filter).map_err(|e| TelemetryError::InvalidFilter {
        reason: e.to_string(),
        filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_directive_overrides_fallback() {
        let filter = resolve_filter(Some("roster_pipeline=trace".to_string()), "info").unwrap();
        assert!(filter.to_string().contains("roster_pipeline=trace"));
    }

    #[test]
    fn test_blank_env_uses_fallback() {
        let filter = resolve_filter(Some("  ".to_string()), "warn").unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(matches!(
            resolve_filter(None, "roster_pipeline=loudest"),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }
}
