//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery, environment
//! detection and environment-variable overrides on top of the built-in defaults.

use super::EngineConfig;
use crate::error::Result;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const ENV_PREFIX: &str = "DEALWATCH";
const ENV_SEPARATOR: &str = "__";
const BASE_FILE: &str = "dealwatch.yaml";

pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory(Self::default_config_directory(), &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory(
        config_directory: impl AsRef<Path>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        Self::build(config_directory.as_ref(), environment, None)
    }

    /// Same as [`Self::load_from_directory`] but reads overrides from `vars` instead of
    /// the process environment
    pub fn load_with_overrides(
        config_directory: impl AsRef<Path>,
        environment: &str,
        vars: HashMap<String, String>,
    ) -> Result<Arc<ConfigManager>> {
        Self::build(config_directory.as_ref(), environment, Some(vars))
    }

    fn build(
        config_directory: &Path,
        environment: &str,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Arc<ConfigManager>> {
        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading engine configuration"
        );

        let env_file = config_directory.join(format!("dealwatch.{environment}.yaml"));
        let config = Config::builder()
            .add_source(File::from(config_directory.join(BASE_FILE)).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?
            .try_deserialize::<EngineConfig>()?;

        config.validate()?;

        debug!(
            scan_budget = config.worker.scan_budget,
            live_calls_enabled = config.worker.live_calls_enabled,
            lock_key = %config.lock.key,
            redis_configured = config.redis.url.is_some(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: config_directory.to_path_buf(),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment from `DEALWATCH_ENV`, then `APP_ENV`, defaulting to development
    pub fn detect_environment() -> String {
        env::var("DEALWATCH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("DEALWATCH_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockFailureMode;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_with_overrides(dir.path(), "test", HashMap::new()).unwrap();
        assert_eq!(manager.config().worker.scan_budget, 20);
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("dealwatch.yaml"),
            "worker:\n  scan_budget: 10\n  max_deals_per_alert: 3\nlock:\n  failure_mode: fail_closed\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("dealwatch.production.yaml"),
            "worker:\n  scan_budget: 40\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_with_overrides(dir.path(), "production", HashMap::new()).unwrap();
        let config = manager.config();
        assert_eq!(config.worker.scan_budget, 40);
        assert_eq!(config.worker.max_deals_per_alert, 3);
        assert_eq!(config.lock.failure_mode, LockFailureMode::FailClosed);
        assert_eq!(config.lock.ttl_seconds, 600);
    }

    #[test]
    fn test_env_vars_override_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dealwatch.yaml"), "worker:\n  scan_budget: 10\n").unwrap();

        let mut vars = HashMap::new();
        vars.insert("DEALWATCH__WORKER__SCAN_BUDGET".to_string(), "7".to_string());
        vars.insert(
            "DEALWATCH__WORKER__LIVE_CALLS_ENABLED".to_string(),
            "false".to_string(),
        );

        let manager = ConfigManager::load_with_overrides(dir.path(), "test", vars).unwrap();
        assert_eq!(manager.config().worker.scan_budget, 7);
        assert!(!manager.config().worker.live_calls_enabled);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dealwatch.yaml"), "worker:\n  scan_budget: 0\n").unwrap();
        assert!(ConfigManager::load_with_overrides(dir.path(), "test", HashMap::new()).is_err());
    }
}
