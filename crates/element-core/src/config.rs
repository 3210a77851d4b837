//! Configuration for the element library.
//!
//! Configuration is read from a TOML file, then environment variable
//! overrides are merged in and the result is validated.
//!
//! # Example
//!
//! ```toml
//! [api]
//! base_url = "https://studio.example.com"
//! timeout_secs = 30
//!
//! [registration]
//! max_attempts = 20
//! interval_ms = 3000
//! backoff = "fixed"
//! ```
//!
//! ```no_run
//! use element_core::config::LibraryConfig;
//! use std::path::Path;
//!
//! # async fn example() -> element_core::Result<()> {
//! let config = LibraryConfig::load_from_path(Path::new("elements.toml")).await?;
//! println!("Polling {} times", config.registration.max_attempts);
//! # Ok(())
//! # }
//! ```

use crate::error::{ElementError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

// Environment variable names
pub const ENV_API_URL: &str = "ELEMENTS_API_URL";
pub const ENV_API_TOKEN: &str = "ELEMENTS_API_TOKEN";
pub const ENV_API_TIMEOUT_SECS: &str = "ELEMENTS_API_TIMEOUT_SECS";
pub const ENV_POLL_MAX_ATTEMPTS: &str = "ELEMENTS_POLL_MAX_ATTEMPTS";
pub const ENV_POLL_INTERVAL_MS: &str = "ELEMENTS_POLL_INTERVAL_MS";
pub const ENV_POLL_BACKOFF: &str = "ELEMENTS_POLL_BACKOFF";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub api: ApiConfig,
    pub registration: RegistrationConfig,
}

/// Backend API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the studio backend
    pub base_url: String,

    /// Bearer token sent with every request
    pub auth_token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

/// Spacing strategy between registration polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            _ => Err(ElementError::config(format!(
                "Invalid backoff strategy '{}'. Must be one of: fixed, exponential",
                s
            ))),
        }
    }
}

/// Registration polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Number of calls to the registration endpoint before giving up
    pub max_attempts: u32,

    /// Delay between calls in milliseconds
    pub interval_ms: u64,

    /// Fixed or exponential spacing
    pub backoff: BackoffStrategy,

    /// Growth factor for exponential spacing
    pub multiplier: f64,

    /// Upper bound for exponential spacing in milliseconds
    pub max_interval_ms: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval_ms: 3000,
            backoff: BackoffStrategy::Fixed,
            multiplier: 2.0,
            max_interval_ms: 30_000,
        }
    }
}

impl LibraryConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ElementError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded successfully from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text without env overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ElementError::config(format!("Failed to parse config file: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ElementError::config(format!("Failed to serialize config: {}", e)))
    }

    /// Merge environment variable overrides into the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    fn merge_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        debug!("Merging environment variable overrides");

        if let Some(url) = var(ENV_API_URL) {
            debug!("Overriding API base URL from environment: {}", url);
            self.api.base_url = url;
        }

        if let Some(token) = var(ENV_API_TOKEN) {
            debug!("Overriding API token from environment");
            self.api.auth_token = Some(token);
        }

        if let Some(timeout) = var(ENV_API_TIMEOUT_SECS) {
            self.api.timeout_secs = parse_env(ENV_API_TIMEOUT_SECS, &timeout)?;
        }

        if let Some(attempts) = var(ENV_POLL_MAX_ATTEMPTS) {
            self.registration.max_attempts = parse_env(ENV_POLL_MAX_ATTEMPTS, &attempts)?;
        }

        if let Some(interval) = var(ENV_POLL_INTERVAL_MS) {
            self.registration.interval_ms = parse_env(ENV_POLL_INTERVAL_MS, &interval)?;
        }

        if let Some(backoff) = var(ENV_POLL_BACKOFF) {
            self.registration.backoff = backoff.parse()?;
        }

        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<()> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(ElementError::config("api.base_url must not be empty"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ElementError::config(format!(
                "api.base_url '{}' must use http or https",
                base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(ElementError::config("api.timeout_secs must be greater than 0"));
        }

        let registration = &self.registration;
        if registration.max_attempts == 0 {
            return Err(ElementError::config(
                "registration.max_attempts must be greater than 0",
            ));
        }

        if registration.interval_ms == 0 {
            return Err(ElementError::config(
                "registration.interval_ms must be greater than 0",
            ));
        }

        if registration.backoff == BackoffStrategy::Exponential {
            if registration.multiplier < 1.0 {
                return Err(ElementError::config(
                    "registration.multiplier must be at least 1.0",
                ));
            }
            if registration.max_interval_ms < registration.interval_ms {
                return Err(ElementError::config(
                    "registration.max_interval_ms cannot be less than interval_ms",
                ));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ElementError::config(format!("Invalid value for {}: {}", name, e)))
}
