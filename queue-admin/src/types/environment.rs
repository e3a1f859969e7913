//! Environment configuration for different deployment stages

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the queue configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/hmpps-sqs.toml";

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (usually `LocalStack`)
    Development {
        /// Skip the admin token check
        disable_auth: bool,
    },
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development {
                disable_auth: env::var("DISABLE_AUTH").is_ok_and(|val| val.trim() == "true"),
            },
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Whether to show API docs
    #[must_use]
    pub const fn show_api_docs(&self) -> bool {
        matches!(self, Self::Development { .. } | Self::Staging)
    }

    /// Whether admin routes skip the token check, only ever in development
    #[must_use]
    pub const fn disable_auth(&self) -> bool {
        matches!(self, Self::Development { disable_auth: true })
    }

    /// Bearer token required on admin routes
    #[must_use]
    pub fn admin_token(&self) -> Option<String> {
        env::var("QUEUE_ADMIN_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(8080)
    }

    /// Overall timeout of an HTTP request
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(Self::secs("REQUEST_TIMEOUT_SECS").unwrap_or(60))
    }

    /// Interval of the periodic DLQ retry, disabled when unset
    #[must_use]
    pub fn dlq_retry_interval(&self) -> Option<Duration> {
        Self::secs("DLQ_RETRY_INTERVAL_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Upper bound on the time a single DLQ retry keeps receiving
    #[must_use]
    pub fn drain_deadline(&self) -> Duration {
        Duration::from_secs(Self::secs("DLQ_DRAIN_DEADLINE_SECS").unwrap_or(300))
    }

    /// Path of the queue configuration file
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        env::var("HMPPS_SQS_CONFIG").map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    fn secs(name: &str) -> Option<u64> {
        env::var(name).ok().and_then(|val| val.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_environment_from_env() {
        env::remove_var("APP_ENV");
        env::remove_var("DISABLE_AUTH");
        assert_eq!(
            Environment::from_env(),
            Environment::Development {
                disable_auth: false
            }
        );

        env::set_var("APP_ENV", "development");
        env::set_var("DISABLE_AUTH", "true");
        assert_eq!(
            Environment::from_env(),
            Environment::Development { disable_auth: true }
        );

        env::set_var("APP_ENV", "staging");
        assert_eq!(Environment::from_env(), Environment::Staging);
        assert!(!Environment::from_env().disable_auth());

        env::set_var("APP_ENV", "production");
        assert_eq!(Environment::from_env(), Environment::Production);

        env::remove_var("DISABLE_AUTH");
        env::remove_var("APP_ENV");
    }

    #[test]
    #[serial]
    #[should_panic(expected = "Invalid environment: invalid")]
    fn test_invalid_environment() {
        env::set_var("APP_ENV", "invalid");
        let _ = Environment::from_env();
    }

    #[test]
    #[serial]
    fn test_defaults() {
        for name in [
            "PORT",
            "REQUEST_TIMEOUT_SECS",
            "DLQ_RETRY_INTERVAL_SECS",
            "DLQ_DRAIN_DEADLINE_SECS",
            "HMPPS_SQS_CONFIG",
        ] {
            env::remove_var(name);
        }
        let env = Environment::Production;

        assert_eq!(env.port(), 8080);
        assert_eq!(env.request_timeout(), Duration::from_secs(60));
        assert_eq!(env.dlq_retry_interval(), None);
        assert_eq!(env.drain_deadline(), Duration::from_secs(300));
        assert_eq!(env.config_path(), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        env::set_var("DLQ_RETRY_INTERVAL_SECS", "600");
        env::set_var("DLQ_DRAIN_DEADLINE_SECS", "invalid");
        env::set_var("HMPPS_SQS_CONFIG", "/etc/queues.toml");
        let env = Environment::Staging;

        assert_eq!(env.dlq_retry_interval(), Some(Duration::from_secs(600)));
        assert_eq!(env.drain_deadline(), Duration::from_secs(300));
        assert_eq!(env.config_path(), PathBuf::from("/etc/queues.toml"));

        env::set_var("DLQ_RETRY_INTERVAL_SECS", "0");
        assert_eq!(env.dlq_retry_interval(), None);

        env::remove_var("DLQ_RETRY_INTERVAL_SECS");
        env::remove_var("DLQ_DRAIN_DEADLINE_SECS");
        env::remove_var("HMPPS_SQS_CONFIG");
    }
}
