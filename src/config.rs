//! Configuration for the LLM client and its collaborators.
//!
//! The core never reads environment variables directly from other modules;
//! everything flows through [`LlmConfig`], either constructed explicitly or
//! loaded once via [`LlmConfig::from_env`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingKey(String),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    /// Create an invalid-configuration error.
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Configuration for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider identifier, used for logging only.
    pub provider: String,
    /// Model to request.
    pub model: String,
    /// API key sent as a bearer token.
    pub api_key: Option<String>,
    /// Base URL of the chat-completions endpoint.
    pub base_url: String,
    /// Default sampling temperature.
    pub temperature: f32,
    /// Default completion token cap.
    pub max_tokens: u32,
    /// Default nucleus-sampling parameter.
    pub top_p: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry attempts on transient upstream failures.
    pub max_retries: u32,
    /// Rate limit: requests allowed per interval.
    pub rate_limit: u32,
    /// Rate limit interval in seconds.
    pub rate_interval_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            top_p: 1.0,
            timeout_secs: 60,
            max_retries: 3,
            rate_limit: 60,
            rate_interval_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the environment.
    ///
    /// Reads `HIVEKIT_API_KEY` (falling back to `OPENAI_API_KEY`),
    /// `HIVEKIT_BASE_URL`, and `HIVEKIT_MODEL`. Fails when no API key is
    /// present in either variable.
    pub fn from_env() -> ConfigResult<Self> {
        let api_key = std::env::var("HIVEKIT_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| ConfigError::MissingKey("HIVEKIT_API_KEY".to_string()))?;

        let mut config = Self::default();
        config.api_key = Some(api_key);

        if let Ok(base_url) = std::env::var("HIVEKIT_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("HIVEKIT_MODEL") {
            config.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.model.is_empty() {
            return Err(ConfigError::MissingKey("model".to_string()));
        }
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingKey("base_url".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(
                "temperature must be between 0.0 and 2.0",
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("max_tokens must be greater than 0"));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::invalid("rate_limit must be greater than 0"));
        }
        Ok(())
    }
}
