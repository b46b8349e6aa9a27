//! Configuration management
//!
//! Values come from a `ConfigProvider`; in production that is the process
//! environment with the `FRAUD_` prefix (after `.env` has been loaded), in
//! tests an in-memory map. `ScoringServiceConfig` turns them into the
//! components of a `ScoringPipeline`.

use std::collections::HashMap;
use std::env;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{
    HttpEngine, ProcessEngine, ScoringClient, ScoringEngine, DEFAULT_ENGINE_TIMEOUT,
};
use crate::enrichment::{FeatureDeriver, HashedAccountAge, SeededAccountAge};
use crate::error::{Result, ScoringError};
use crate::logging::LoggingConfig;
use crate::pipeline::ScoringPipeline;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
use crate::util::split_list;

/// Prefix for environment variables read by `EnvConfigProvider::default`
pub const ENV_PREFIX: &str = "FRAUD";

/// Name of the breaker guarding the scoring engine
pub const ENGINE_CIRCUIT_NAME: &str = "ml-model";

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a typed value, failing if it is missing or does not parse
    fn get<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: fmt::Display,
    {
        let value = self.get_string(key)?;
        value.trim().parse::<T>().map_err(|e| {
            ScoringError::configuration(format!("Invalid value for key {}: {}", key, e))
        })
    }

    /// Get a typed value if present; a present but unparseable value is an error
    fn get_optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        <T as FromStr>::Err: fmt::Display,
    {
        match self.get_string(key) {
            Ok(_) => self.get(key).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Get a typed value, falling back to `default` when missing
    fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: fmt::Display,
    {
        Ok(self.get_optional(key)?.unwrap_or(default))
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ScoringError::configuration(format!(
                "Invalid boolean value for key {}: {}",
                key, value
            ))),
        }
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get a boolean configuration value with a default
    fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_string(key) {
            Ok(_) => self.get_bool(key),
            Err(_) => Ok(default),
        }
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new().with_prefix(ENV_PREFIX)
    }
}

impl EnvConfigProvider {
    /// Create a provider that reads unprefixed variables
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                ScoringError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => ScoringError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values.get(key).cloned().ok_or_else(|| {
            ScoringError::configuration(format!("Configuration key not found: {}", key))
        })
    }
}

/// Trait for service-specific configuration
pub trait ServiceConfig: Debug + Send + Sync {
    /// Validate this configuration
    fn validate(&self) -> Result<()>;
}

/// How the scoring engine is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineTransport {
    /// Child process fed through stdin/stdout
    Process,
    /// HTTP POST to `engine_url`
    Http,
}

impl FromStr for EngineTransport {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "process" => Ok(EngineTransport::Process),
            "http" => Ok(EngineTransport::Http),
            other => Err(ScoringError::configuration(format!(
                "unknown engine transport {:?}, expected \"process\" or \"http\"",
                other
            ))),
        }
    }
}

/// Scoring engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub transport: EngineTransport,
    /// Program to run for the process transport
    pub command: String,
    pub args: Vec<String>,
    /// Endpoint for the http transport
    pub url: Option<String>,
    /// Bound on a single engine call
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: EngineTransport::Process,
            command: "python3".to_string(),
            args: vec!["ml_model/predict.py".to_string()],
            url: None,
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }
}

/// Everything needed to assemble a `ScoringPipeline`
#[derive(Debug, Clone)]
pub struct ScoringServiceConfig {
    pub engine: EngineConfig,
    pub breaker: CircuitBreakerConfig,
    /// Model family used when the caller does not choose one
    pub default_model_type: String,
    /// Model version used when the caller does not choose one
    pub default_model_version: String,
    /// Seed for random account-age estimates; hashed estimates when unset
    pub account_age_seed: Option<u64>,
    pub logging: LoggingConfig,
}

impl Default for ScoringServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            default_model_type: "xgboost".to_string(),
            default_model_version: "v1".to_string(),
            account_age_seed: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ScoringServiceConfig {
    /// Load configuration from `FRAUD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_provider(&EnvConfigProvider::default())
    }

    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();

        let engine = EngineConfig {
            transport: provider.get_or("engine_transport", defaults.engine.transport)?,
            command: provider.get_string_or("engine_command", &defaults.engine.command),
            args: match provider.get_string("engine_args") {
                Ok(args) => split_list(&args),
                Err(_) => defaults.engine.args,
            },
            url: provider
                .get_string("engine_url")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            timeout: Duration::from_millis(
                provider.get_or("engine_timeout_ms", defaults.engine.timeout.as_millis() as u64)?,
            ),
        };

        let breaker = CircuitBreakerConfig {
            interval: Duration::from_secs(
                provider.get_or("breaker_interval_secs", defaults.breaker.interval.as_secs())?,
            ),
            min_requests: provider.get_or("breaker_min_requests", defaults.breaker.min_requests)?,
            failure_threshold: provider
                .get_or("breaker_failure_threshold", defaults.breaker.failure_threshold)?,
            open_timeout: Duration::from_secs(provider.get_or(
                "breaker_open_timeout_secs",
                defaults.breaker.open_timeout.as_secs(),
            )?),
            half_open_max_calls: provider
                .get_or("breaker_half_open_trials", defaults.breaker.half_open_max_calls)?,
        };

        let logging = LoggingConfig {
            level: provider.get_string_or("log_level", &defaults.logging.level),
            json_format: provider.get_bool_or("log_json", defaults.logging.json_format)?,
            ..defaults.logging
        };

        let config = Self {
            engine,
            breaker,
            default_model_type: provider
                .get_string_or("default_model_type", &defaults.default_model_type),
            default_model_version: provider
                .get_string_or("default_model_version", &defaults.default_model_version),
            account_age_seed: provider.get_optional("account_age_seed")?,
            logging,
        };

        config.validate()?;
        Ok(config)
    }

    /// Build the configured engine transport
    pub fn build_engine(&self) -> Result<Arc<dyn ScoringEngine>> {
        match self.engine.transport {
            EngineTransport::Process => Ok(Arc::new(ProcessEngine::new(
                self.engine.command.clone(),
                self.engine.args.clone(),
            ))),
            EngineTransport::Http => {
                let url = self.engine.url.clone().ok_or_else(|| {
                    ScoringError::configuration("engine_url is required for the http transport")
                })?;
                Ok(Arc::new(HttpEngine::new(url, self.engine.timeout)?))
            }
        }
    }

    pub fn build_deriver(&self) -> FeatureDeriver {
        match self.account_age_seed {
            Some(seed) => FeatureDeriver::new(Arc::new(SeededAccountAge::new(seed))),
            None => FeatureDeriver::new(Arc::new(HashedAccountAge)),
        }
    }

    pub fn build_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(ENGINE_CIRCUIT_NAME, self.breaker.clone()))
    }

    /// Assemble a pipeline with its own breaker
    pub fn build_pipeline(&self) -> Result<ScoringPipeline> {
        let client = ScoringClient::new(self.build_engine()?, self.engine.timeout);
        Ok(ScoringPipeline::new(
            self.build_deriver(),
            client,
            self.build_breaker(),
        ))
    }
}

impl ServiceConfig for ScoringServiceConfig {
    fn validate(&self) -> Result<()> {
        match self.engine.transport {
            EngineTransport::Process if self.engine.command.trim().is_empty() => {
                return Err(ScoringError::configuration("engine_command must not be empty"));
            }
            EngineTransport::Http if self.engine.url.is_none() => {
                return Err(ScoringError::configuration(
                    "engine_url is required for the http transport",
                ));
            }
            _ => {}
        }

        if self.engine.timeout.is_zero() {
            return Err(ScoringError::configuration("engine_timeout_ms must be positive"));
        }

        let threshold = self.breaker.failure_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ScoringError::configuration(format!(
                "breaker_failure_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.breaker.min_requests == 0 {
            return Err(ScoringError::configuration("breaker_min_requests must be positive"));
        }
        if self.breaker.half_open_max_calls == 0 {
            return Err(ScoringError::configuration(
                "breaker_half_open_trials must be positive",
            ));
        }

        if self.default_model_type.trim().is_empty() || self.default_model_version.trim().is_empty()
        {
            return Err(ScoringError::configuration(
                "default model type and version must not be empty",
            ));
        }

        Ok(())
    }
}
