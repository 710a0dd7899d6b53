//! Configuration Builder
//!
//! Fluent builder for token manager configuration.

use std::time::Duration;
use tracing::warn;

use crate::error::ConfigurationError;
use crate::resilience::RetryConfig;
use crate::types::{
    parse_endpoint, ClientAuthMethod, ClientCredentials, TokenManagerConfig,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SAFETY_MARGIN,
};

/// Token manager configuration builder.
#[derive(Default)]
pub struct TokenManagerConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_method: Option<ClientAuthMethod>,
    token_endpoint: Option<String>,
    scopes: Vec<String>,
    safety_margin: Option<Duration>,
    request_timeout: Option<Duration>,
    retry: RetryConfig,
}

impl TokenManagerConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Set client authentication method.
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    /// Set token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set requested scopes.
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Add a requested scope.
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Set how long before expiry a token is refreshed.
    pub fn safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = Some(margin);
        self
    }

    /// Set request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set extra attempts after a transient failure.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Set the first retry delay.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    /// Set the retry delay cap.
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry.max_delay = delay;
        self
    }

    /// Load settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OAUTH2_CLIENT_ID`: client identifier
    /// - `OAUTH2_CLIENT_SECRET`: client secret
    /// - `OAUTH2_TOKEN_ENDPOINT`: token endpoint URL (HTTPS)
    /// - `OAUTH2_SCOPES`: space-separated scopes
    /// - `OAUTH2_SAFETY_MARGIN_SECS`: safety margin in seconds
    /// - `OAUTH2_REQUEST_TIMEOUT_SECS`: request timeout in seconds
    /// - `OAUTH2_MAX_RETRIES`: extra attempts after a transient failure
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(client_id) = lookup("OAUTH2_CLIENT_ID") {
            self.client_id = Some(client_id);
        }

        if let Some(client_secret) = lookup("OAUTH2_CLIENT_SECRET") {
            self.client_secret = Some(client_secret);
        }

        if let Some(endpoint) = lookup("OAUTH2_TOKEN_ENDPOINT") {
            self.token_endpoint = Some(endpoint);
        }

        if let Some(scopes) = lookup("OAUTH2_SCOPES") {
            self.scopes = scopes.split_whitespace().map(String::from).collect();
        }

        if let Some(secs) = parse_env_number::<u64>(&lookup, "OAUTH2_SAFETY_MARGIN_SECS") {
            self.safety_margin = Some(Duration::from_secs(secs));
        }

        if let Some(secs) = parse_env_number::<u64>(&lookup, "OAUTH2_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = Some(Duration::from_secs(secs));
        }

        if let Some(retries) = parse_env_number::<u32>(&lookup, "OAUTH2_MAX_RETRIES") {
            self.retry.max_retries = retries;
        }

        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<TokenManagerConfig, ConfigurationError> {
        let client_id = self
            .client_id
            .ok_or_else(|| ConfigurationError::MissingRequired {
                field: "client_id".to_string(),
            })?;

        let client_secret =
            self.client_secret
                .ok_or_else(|| ConfigurationError::MissingRequired {
                    field: "client_secret".to_string(),
                })?;

        let token_endpoint =
            self.token_endpoint
                .ok_or_else(|| ConfigurationError::MissingRequired {
                    field: "token_endpoint".to_string(),
                })?;

        let mut credentials = ClientCredentials::new(client_id, client_secret);
        if let Some(method) = self.auth_method {
            credentials.auth_method = method;
        }

        let config = TokenManagerConfig {
            credentials,
            token_endpoint: parse_endpoint(&token_endpoint)?,
            scopes: self.scopes,
            safety_margin: self.safety_margin.unwrap_or(DEFAULT_SAFETY_MARGIN),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            retry: self.retry,
        };
        config.validate()?;

        Ok(config)
    }
}

fn parse_env_number<N: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<N> {
    let raw = lookup(key)?;
    match raw.trim().parse::<N>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

/// Create a new token manager configuration builder.
pub fn token_manager_config() -> TokenManagerConfigBuilder {
    TokenManagerConfigBuilder::new()
}
