// Configuration management

use crate::error::{Result, SvcdeckError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Minimum health check interval accepted at the boundary
pub const MIN_HEALTH_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
    pub control_cooldown_ms: u64,
    pub operation_timeout_ms: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown_ms: u64,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub failure_threshold: u32,
    pub auto_restart: bool,
    pub notify_on_transition: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5_000,
            cache_max_entries: 50,
            control_cooldown_ms: 2_000,
            operation_timeout_ms: 30_000,
            circuit_failure_threshold: 5,
            circuit_cooldown_ms: 30_000,
            health: HealthConfig::default(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
            failure_threshold: 3,
            auto_restart: false,
            notify_on_transition: true,
        }
    }
}

impl Config {
    /// Get default config path: ~/.config/svcdeck/config.yaml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("svcdeck").join("config.yaml"))
    }

    /// Load config from path, falling back to defaults if not found
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| Self::default_path().unwrap_or_default());

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_yaml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to path
    pub fn save(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Boundary validation applied before any value reaches the core
    pub fn validate(&self) -> Result<()> {
        if self.cache_max_entries == 0 {
            return Err(
                SvcdeckError::Config("cache_max_entries must be at least 1".into()).into(),
            );
        }
        if self.operation_timeout_ms == 0 {
            return Err(
                SvcdeckError::Config("operation_timeout_ms must be positive".into()).into(),
            );
        }
        self.health.validate()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn control_cooldown(&self) -> Duration {
        Duration::from_millis(self.control_cooldown_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }
}

impl HealthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms < MIN_HEALTH_INTERVAL_MS {
            return Err(SvcdeckError::Config(format!(
                "health interval must be at least {} ms",
                MIN_HEALTH_INTERVAL_MS
            ))
            .into());
        }
        if self.failure_threshold < 1 {
            return Err(
                SvcdeckError::Config("health failure threshold must be at least 1".into()).into(),
            );
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Partial health config merge, applied by `HealthCheckManager::update_config`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthConfigUpdate {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub auto_restart: Option<bool>,
    pub notify_on_transition: Option<bool>,
}

impl HealthConfig {
    /// Merge a partial update, validating the merged result
    pub fn merged(&self, update: &HealthConfigUpdate) -> Result<HealthConfig> {
        let merged = HealthConfig {
            enabled: update.enabled.unwrap_or(self.enabled),
            interval_ms: update.interval_ms.unwrap_or(self.interval_ms),
            failure_threshold: update.failure_threshold.unwrap_or(self.failure_threshold),
            auto_restart: update.auto_restart.unwrap_or(self.auto_restart),
            notify_on_transition: update
                .notify_on_transition
                .unwrap_or(self.notify_on_transition),
        };
        merged.validate()?;
        Ok(merged)
    }
}
