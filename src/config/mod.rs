//! Relay configuration.
//!
//! Everything the relay needs is gathered into a [`Config`] once at startup
//! and handed to the services that use it. Nothing is read from the
//! environment after that; the binary does the reading.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::server::DEFAULT_MAX_REQUEST_SIZE;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 400;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no provider API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    Temperature(f32),

    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,

    #[error("upstream base URL must start with http:// or https://, got {0:?}")]
    BaseUrl(String),
}

/// Contact details the assistant may offer for detailed project enquiries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactDetails {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}

/// Settings for the chat-completion provider.
///
/// The API key is a [`SecretString`], so `Debug` output redacts it.
#[derive(Debug)]
pub struct UpstreamConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub connect_timeout: Duration,
    /// Covers the whole exchange, including reading the streamed body.
    pub request_timeout: Duration,
    pub contact: ContactDetails,
}

impl UpstreamConfig {
    /// Creates a configuration with the provider defaults.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            contact: ContactDetails::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    #[must_use]
    pub fn with_contact(mut self, contact: ContactDetails) -> Self {
        self.contact = contact;
        self
    }

    /// The chat-completions endpoint under `base_url`.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Temperature(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::BaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

/// Complete relay configuration.
#[derive(Debug)]
pub struct Config {
    pub listen: String,
    pub max_request_bytes: usize,
    /// Origins allowed to call the relay from the browser; empty means
    /// same-origin only.
    pub allowed_origins: Vec<String>,
    pub upstream: UpstreamConfig,
}

impl Config {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_owned(),
            max_request_bytes: DEFAULT_MAX_REQUEST_SIZE,
            allowed_origins: Vec::new(),
            upstream,
        }
    }

    #[must_use]
    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    #[must_use]
    pub fn with_max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.upstream.validate()
    }
}
