//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Algorithm, KeyMode, Quota};

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Engine configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Request admission configuration
    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Quota and storage settings for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Quota for token-identified callers
    #[serde(default)]
    pub token: QuotaConfig,

    /// Quota for address-identified callers
    #[serde(default)]
    pub ip: QuotaConfig,

    /// Keys idle longer than this are evicted
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often the eviction task runs
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,

    /// Shards per key store, rounded up to a power of two
    #[serde(default = "default_shards")]
    pub shards: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            token: QuotaConfig::default(),
            ip: QuotaConfig::default(),
            idle_timeout_secs: default_idle_timeout(),
            eviction_interval_secs: default_eviction_interval(),
            shards: default_shards(),
        }
    }
}

/// Quota settings for one identification mode.
///
/// Every field has a default, so a mode can be switched off or retuned by
/// setting a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Whether this mode is used to identify callers
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum events per window
    #[serde(default = "default_max_events")]
    pub max_events: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Counting algorithm
    #[serde(default)]
    pub algorithm: Algorithm,
}

impl QuotaConfig {
    /// Build the validated quota.
    pub fn quota(&self) -> Result<Quota> {
        Quota::new(
            self.max_events,
            Duration::from_millis(self.window_ms),
            self.algorithm,
        )
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_events: default_max_events(),
            window_ms: default_window_ms(),
            algorithm: Algorithm::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_events() -> u64 {
    10
}

fn default_window_ms() -> u64 {
    1000
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_eviction_interval() -> u64 {
    60
}

fn default_shards() -> usize {
    crate::ratelimit::DEFAULT_SHARDS
}

impl LimiterConfig {
    /// Quota settings for a mode.
    pub fn mode(&self, mode: KeyMode) -> &QuotaConfig {
        match mode {
            KeyMode::Token => &self.token,
            KeyMode::Ip => &self.ip,
        }
    }

    /// Idle threshold after which a key is evicted.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Period of the eviction task.
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Check every setting the engine depends on.
    pub fn validate(&self) -> Result<()> {
        for mode in [KeyMode::Token, KeyMode::Ip] {
            self.mode(mode)
                .quota()
                .map_err(|e| TurnstileError::Config(format!("{} quota: {}", mode, e)))?;
        }
        if self.idle_timeout_secs == 0 {
            return Err(TurnstileError::Config(
                "idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.eviction_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "eviction_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.shards == 0 {
            return Err(TurnstileError::Config(
                "shards must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What to do with a request when the limiter itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Refuse the request
    #[default]
    Closed,
    /// Let the request through unmetered
    Open,
}

/// Settings for resolving and answering requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Header carrying the caller's token
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Behaviour on limiter failure
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    ///
    /// Only safe behind a proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            token_header: default_token_header(),
            failure_policy: FailurePolicy::default(),
            trust_proxy_headers: false,
        }
    }
}

fn default_token_header() -> String {
    "API_KEY".to_string()
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file, overridden by
    /// `TURNSTILE_`-prefixed environment variables.
    ///
    /// Nested keys are separated by a double underscore, for example
    /// `TURNSTILE_LIMITER__IP__MAX_EVENTS=20`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Yaml,
            ));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: TurnstileConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file without environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;
        if self.admission.token_header.trim().is_empty() {
            return Err(TurnstileError::Config(
                "token_header must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TurnstileConfig::default();
        config.validate().unwrap();
        assert_eq!(config.admission.token_header, "API_KEY");
        assert_eq!(config.admission.failure_policy, FailurePolicy::Closed);
        assert!(config.limiter.token.enabled);
        assert!(config.limiter.ip.enabled);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
limiter:
  ip:
    enabled: false
    max_events: 5
    window_ms: 2000
    algorithm: token_bucket
  idle_timeout_secs: 30
admission:
  failure_policy: open
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert!(!config.limiter.ip.enabled);
        assert_eq!(config.limiter.ip.max_events, 5);
        assert_eq!(config.limiter.ip.algorithm, Algorithm::TokenBucket);
        assert_eq!(config.limiter.idle_timeout(), Duration::from_secs(30));
        // Untouched sections keep their defaults
        assert_eq!(config.limiter.token.max_events, 10);
        assert_eq!(config.limiter.token.window_ms, 1000);
        assert_eq!(config.limiter.eviction_interval_secs, 60);
        assert_eq!(config.admission.token_header, "API_KEY");
        assert_eq!(config.admission.failure_policy, FailurePolicy::Open);
    }

    #[test]
    fn test_mode_disabled_with_only_enabled_flag() {
        let config = TurnstileConfig::from_yaml("limiter:\n  ip:\n    enabled: false\n").unwrap();
        assert!(!config.limiter.ip.enabled);
        assert_eq!(config.limiter.ip.max_events, 10);
        assert_eq!(config.limiter.ip.window_ms, 1000);
        assert_eq!(config.limiter.ip.algorithm, Algorithm::SlidingWindow);
        assert!(config.limiter.token.enabled);
    }

    #[test]
    fn test_single_quota_field_override() {
        let config = TurnstileConfig::from_yaml("limiter:\n  token:\n    max_events: 3\n").unwrap();
        assert_eq!(config.limiter.token.max_events, 3);
        assert_eq!(config.limiter.token.window_ms, 1000);
        assert!(config.limiter.token.enabled);
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = r#"
limiter:
  token:
    max_events: 5
    window_ms: 0
"#;
        let err = TurnstileConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(msg) if msg.contains("token quota")));
    }

    #[test]
    fn test_zero_events_rejected() {
        let mut config = TurnstileConfig::default();
        config.limiter.ip.max_events = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_eviction_interval_rejected() {
        let mut config = TurnstileConfig::default();
        config.limiter.eviction_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_token_header_rejected() {
        let mut config = TurnstileConfig::default();
        config.admission.token_header = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "limiter:\n  token:\n    max_events: 42\n    window_ms: 500\nadmission:\n  token_header: X-Api-Key\n",
        )
        .unwrap();

        let config = TurnstileConfig::load(Some(path.as_path())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.token.max_events, 42);
        assert_eq!(config.limiter.token.window_ms, 500);
        assert_eq!(config.admission.token_header, "X-Api-Key");
    }
}
