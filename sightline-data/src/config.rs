//! Data layer configuration
//!
//! Defaults are tuned for interactive dashboard use; every knob can be
//! overridden from the environment:
//!
//! - `SIGHTLINE_BASE_TTL_SECS` - freshness of unfiltered base entries
//! - `SIGHTLINE_FILTERED_TTL_SECS` - freshness of filtered entries
//! - `SIGHTLINE_BATCH_WINDOW_MS` - batching window length
//! - `SIGHTLINE_SWEEP_CEILING_SECS` - age at which sweep removes entries
//! - `SIGHTLINE_SWEEP_INTERVAL_SECS` - how often the sweep task runs
//! - `SIGHTLINE_FETCH_MAX_RETRIES` - transient-failure retry budget
//! - `SIGHTLINE_PREFETCH_MIN_SAMPLES` - navigation samples before warmup

use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DataLayerConfig {
    /// TTL for unfiltered base entries. Base data is reused across filter
    /// changes, so it lives longer than any filtered slice.
    pub base_ttl: Duration,
    /// TTL for filtered entries - narrower and more volatile.
    pub filtered_ttl: Duration,
    /// Batch window length (anchored at the first enqueue).
    pub batch_window: Duration,
    /// Age ceiling past which sweep removes entries outright.
    pub sweep_ceiling: Duration,
    /// Interval of the background sweep task.
    pub sweep_interval: Duration,
    /// Retry policy for transient fetch failures.
    pub retry: RetryConfig,
    /// Navigation samples required before a transition drives prefetch.
    pub prefetch_min_samples: u64,
}

impl Default for DataLayerConfig {
    fn default() -> Self {
        Self {
            base_ttl: Duration::from_secs(300),
            filtered_ttl: Duration::from_secs(60),
            batch_window: Duration::from_millis(50),
            sweep_ceiling: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            retry: RetryConfig::default(),
            prefetch_min_samples: 3,
        }
    }
}

impl DataLayerConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            base_ttl: env_secs("SIGHTLINE_BASE_TTL_SECS", defaults.base_ttl)?,
            filtered_ttl: env_secs("SIGHTLINE_FILTERED_TTL_SECS", defaults.filtered_ttl)?,
            batch_window: env_millis("SIGHTLINE_BATCH_WINDOW_MS", defaults.batch_window)?,
            sweep_ceiling: env_secs("SIGHTLINE_SWEEP_CEILING_SECS", defaults.sweep_ceiling)?,
            sweep_interval: env_secs("SIGHTLINE_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            retry: RetryConfig {
                max_retries: env_parse(
                    "SIGHTLINE_FETCH_MAX_RETRIES",
                    defaults.retry.max_retries,
                )?,
                ..defaults.retry
            },
            prefetch_min_samples: env_parse(
                "SIGHTLINE_PREFETCH_MIN_SAMPLES",
                defaults.prefetch_min_samples,
            )?,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_secs(env_parse(
        key,
        default.as_secs(),
    )?))
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_millis(env_parse(
        key,
        default.as_millis() as u64,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = DataLayerConfig::default();
        assert!(config.base_ttl > config.filtered_ttl);
        assert!(config.sweep_ceiling > config.base_ttl);
        assert!(config.batch_window < Duration::from_secs(1));
    }

    #[test]
    fn test_from_env_uses_defaults_when_unset() {
        // The suite never sets SIGHTLINE_* vars, so this mirrors a clean env.
        let config = DataLayerConfig::from_env().unwrap();
        assert_eq!(config.base_ttl, Duration::from_secs(300));
        assert_eq!(config.batch_window, Duration::from_millis(50));
    }
}
