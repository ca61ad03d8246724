use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use super::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("instance_id must not be empty")]
    EmptyInstanceId,
    #[error("app_prefix must not be empty")]
    EmptyAppPrefix,
    #[error("database path must not be empty")]
    EmptyDatabasePath,
    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
    #[error("lease_ttl_ms must be greater than heartbeat_interval_ms")]
    LeaseNotLongerThanHeartbeat,
}

/// Hierarchical configuration loader: compiled-in defaults ->
/// `conclave.yaml` -> `conclave.local.yaml` -> `CONCLAVE_`-prefixed env
/// vars, each tier overriding the last.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("conclave.yaml"))
            .merge(Yaml::file("conclave.local.yaml"))
            .merge(Env::prefixed("CONCLAVE_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.instance_id.is_empty() {
            return Err(ConfigError::EmptyInstanceId);
        }
        if config.app_prefix.is_empty() {
            return Err(ConfigError::EmptyAppPrefix);
        }
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.cluster.lease_ttl_ms <= config.cluster.heartbeat_interval_ms {
            return Err(ConfigError::LeaseNotLongerThanHeartbeat);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.app_prefix, "conclave");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn yaml_parsing_overrides_defaults() {
        let yaml = r"
instance_id: node-a
cluster:
  heartbeat_interval_ms: 2000
  lease_ttl_ms: 8000
logging:
  level: debug
  format: pretty
";
        let config: Config = serde_yaml::from_str(yaml).expect("yaml should parse");
        assert_eq!(config.instance_id, "node-a");
        assert_eq!(config.cluster.heartbeat_interval_ms, 2000);
        assert_eq!(config.logging.level, "debug");
        ConfigLoader::validate(&config).expect("parsed config should be valid");
    }

    #[test]
    fn rejects_empty_instance_id() {
        let config = Config { instance_id: String::new(), ..Default::default() };
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyInstanceId)));
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn rejects_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));
    }

    #[test]
    fn rejects_lease_shorter_than_heartbeat() {
        let mut config = Config::default();
        config.cluster.heartbeat_interval_ms = 10_000;
        config.cluster.lease_ttl_ms = 5_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::LeaseNotLongerThanHeartbeat)
        ));
    }

    #[test]
    fn env_override_wins_over_file_defaults() {
        unsafe {
            env::set_var("CONCLAVE_INSTANCE_ID", "env-instance");
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("CONCLAVE_").split("__"))
            .extract()
            .unwrap();
        assert_eq!(config.instance_id, "env-instance");

        unsafe {
            env::remove_var("CONCLAVE_INSTANCE_ID");
        }
    }

    #[test]
    fn hierarchical_merging_lets_later_tiers_win() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "instance_id: base\nlogging:\n  level: info\n  format: json").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "instance_id: override\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.instance_id, "override");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, crate::infrastructure::logging::LogFormat::Json);
    }
}
