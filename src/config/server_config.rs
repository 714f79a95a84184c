//! Process-level configuration read from the environment.

use std::env;

/// Environment mode. Toggles live gas queries vs fixed fallback values and
/// auto-funding vs fail-fast in the funding monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_str(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" | "staging" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub config_file_path: String,
    /// When unset, in-memory locks, repositories and caches are used.
    pub redis_url: Option<String>,
    pub environment: Environment,
    pub funding_check_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            config_file_path: env::var("CONFIG_FILE_PATH")
                .unwrap_or_else(|_| "config/relay.json".to_string()),
            redis_url: env::var("REDIS_URL").ok(),
            environment: Environment::from_str(
                &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            ),
            funding_check_interval_secs: env::var("FUNDING_CHECK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn environment_parsing() {
        assert_eq!(Environment::from_str("production"), Environment::Production);
        assert_eq!(Environment::from_str("staging"), Environment::Production);
        assert_eq!(Environment::from_str("development"), Environment::Development);
        assert_eq!(Environment::from_str("anything"), Environment::Development);
        assert!(Environment::Development.is_development());
    }

    #[test]
    #[serial]
    fn from_env_defaults() {
        std::env::remove_var("CONFIG_FILE_PATH");
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("ENVIRONMENT");
        std::env::remove_var("FUNDING_CHECK_INTERVAL_SECS");

        let config = ServerConfig::from_env();
        assert_eq!(config.config_file_path, "config/relay.json");
        assert_eq!(config.redis_url, None);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.funding_check_interval_secs, 300);
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        std::env::set_var("ENVIRONMENT", "production");
        std::env::set_var("FUNDING_CHECK_INTERVAL_SECS", "60");

        let config = ServerConfig::from_env();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.funding_check_interval_secs, 60);

        std::env::remove_var("ENVIRONMENT");
        std::env::remove_var("FUNDING_CHECK_INTERVAL_SECS");
    }
}
