use std::time::Duration;

use common_metrics::{Buckets, MetricsConfig};
use envconfig::Envconfig;
use serde::Serialize;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "PORT", default = "3000")]
    pub port: u16,

    #[envconfig(from = "ENVIRONMENT", default = "development")]
    pub environment: String,

    #[envconfig(from = "COMMIT_SHA", default = "unknown")]
    pub commit: String,

    #[envconfig(from = "BUILD_NUMBER", default = "unknown")]
    pub build: String,

    #[envconfig(from = "SERVICE_VERSION", default = "0.0.0")]
    pub version: String,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_SECS", default = "30")]
    pub shutdown_timeout_secs: u64,

    // When false no OS signal is trapped, the embedder drives shutdown itself
    #[envconfig(from = "TRAP_SIGNALS", default = "true")]
    pub trap_signals: bool,

    #[envconfig(
        from = "HTTP_DURATION_BUCKETS",
        default = "0.005,0.01,0.025,0.05,0.1,0.25,0.5,1,2.5,5,10"
    )]
    pub duration_buckets: Buckets,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn build_info(&self) -> BuildInfo {
        BuildInfo {
            env: self.environment.clone(),
            commit: self.commit.clone(),
            build: self.build.clone(),
            version: self.version.clone(),
        }
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig::default().with_buckets(self.duration_buckets.clone())
    }

    /// Loopback, ephemeral port, no signal trapping and a short drain timeout.
    pub fn default_test_config() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            commit: "unknown".to_string(),
            build: "unknown".to_string(),
            version: "0.0.0".to_string(),
            shutdown_timeout_secs: 5,
            trap_signals: false,
            duration_buckets: Buckets::default(),
        }
    }
}

/// Static build metadata served on `/`. Field order is the JSON key order.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BuildInfo {
    pub env: String,
    pub commit: String,
    pub build: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.bind(), "0.0.0.0:3000");
        assert_eq!(config.environment, "development");
        assert_eq!(config.version, "0.0.0");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert!(config.trap_signals);
        assert_eq!(config.duration_buckets, Buckets::default());
    }

    #[test]
    fn test_config_from_env_values() {
        let env = HashMap::from([
            ("PORT".to_string(), "8080".to_string()),
            ("ENVIRONMENT".to_string(), "production".to_string()),
            ("COMMIT_SHA".to_string(), "abc123".to_string()),
            ("BUILD_NUMBER".to_string(), "42".to_string()),
            ("SERVICE_VERSION".to_string(), "1.2.3".to_string()),
            ("TRAP_SIGNALS".to_string(), "false".to_string()),
            ("HTTP_DURATION_BUCKETS".to_string(), "0.1,1".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.port, 8080);
        assert!(!config.trap_signals);
        assert_eq!(&config.metrics_config().duration_buckets[..], &[0.1, 1.0]);
        assert_eq!(
            config.build_info(),
            BuildInfo {
                env: "production".to_string(),
                commit: "abc123".to_string(),
                build: "42".to_string(),
                version: "1.2.3".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_buckets_are_rejected() {
        let env = HashMap::from([(
            "HTTP_DURATION_BUCKETS".to_string(),
            "fast,slow".to_string(),
        )]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
