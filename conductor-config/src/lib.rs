//! ABOUTME: Central configuration management for Conductor
//! ABOUTME: Layers defaults, an optional TOML file, and CONDUCTOR_-prefixed env vars

use conductor_core::{ConductorError, Result};
use serde::{Deserialize, Serialize};

/// Configuration file discovery order, checked relative to the current
/// working directory.
const CONFIG_SEARCH_PATHS: &[&str] = &["conductor.toml", ".conductor.toml", "config/conductor.toml"];

const ENV_PREFIX: &str = "CONDUCTOR";

/// Options governing §6's "Configuration options" table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConductorConfig {
    /// Per-node retry budget.
    pub max_retries: u32,
    /// TTL in seconds for `agents:{session}`.
    pub session_timeout_s: u64,
    /// TTL in seconds for all checkpoint keys.
    pub checkpoint_ttl_s: u64,
    /// Message-bus rate window, seconds.
    pub rate_limit_window_s: u64,
    /// Max messages per window per sender.
    pub rate_limit_max: u32,
    /// Live-stream TTL, seconds.
    pub message_ttl_s: u64,
    /// Dead-letter TTL, seconds.
    pub dead_letter_ttl_s: u64,
    /// Sandbox CPU ceiling, in cores.
    pub max_cpu_cores: f64,
    /// Sandbox memory ceiling, in MB.
    pub max_memory_mb: u64,
    /// Sandbox default wait timeout, seconds.
    pub default_timeout_s: u64,
    /// Meta-orchestrator business context reload interval, seconds.
    pub business_context_refresh_s: u64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            session_timeout_s: 3600,
            checkpoint_ttl_s: 86_400,
            rate_limit_window_s: 60,
            rate_limit_max: 100,
            message_ttl_s: 604_800,
            dead_letter_ttl_s: 2_592_000,
            max_cpu_cores: 2.0,
            max_memory_mb: 1024,
            default_timeout_s: 300,
            business_context_refresh_s: 300,
        }
    }
}

impl ConductorConfig {
    /// Load configuration, layering defaults, the first config file found
    /// along `CONFIG_SEARCH_PATHS` (if any), and `CONDUCTOR_*` environment
    /// variables, in that order.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(config_err)?);

        for path in CONFIG_SEARCH_PATHS {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
                break;
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("_")
                .try_parsing(true),
        );

        let built = builder.build().map_err(config_err)?;
        built.try_deserialize().map_err(config_err)
    }

    /// Load from a specific TOML file, bypassing search-path discovery.
    /// Environment variables still take precedence.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(config_err)?)
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("_")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_err)?;
        built.try_deserialize().map_err(config_err)
    }
}

fn config_err(e: config::ConfigError) -> ConductorError {
    ConductorError::Configuration(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = ConductorConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.session_timeout_s, 3600);
        assert_eq!(cfg.checkpoint_ttl_s, 86_400);
        assert_eq!(cfg.rate_limit_window_s, 60);
        assert_eq!(cfg.rate_limit_max, 100);
        assert_eq!(cfg.message_ttl_s, 604_800);
        assert_eq!(cfg.dead_letter_ttl_s, 2_592_000);
        assert!((cfg.max_cpu_cores - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.max_memory_mb, 1024);
        assert_eq!(cfg.default_timeout_s, 300);
        assert_eq!(cfg.business_context_refresh_s, 300);
    }

    #[test]
    #[serial]
    fn env_override_takes_precedence() {
        std::env::set_var("CONDUCTOR_MAX_RETRIES", "7");
        let cfg = ConductorConfig::load().unwrap();
        assert_eq!(cfg.max_retries, 7);
        std::env::remove_var("CONDUCTOR_MAX_RETRIES");
    }

    #[test]
    #[serial]
    fn file_override_applies() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("c.toml");
        std::fs::write(&file, "rate_limit_max = 42\n").unwrap();
        let cfg = ConductorConfig::load_from(&file).unwrap();
        assert_eq!(cfg.rate_limit_max, 42);
        assert_eq!(cfg.max_retries, 3);
    }
}
