//! Configuration Types
//!
//! Token manager configuration and client credentials.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ConfigurationError;
use crate::resilience::RetryConfig;

/// Default safety margin subtracted from the reported expiry.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(300);

/// Default token endpoint request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Token manager configuration.
#[derive(Clone, Debug)]
pub struct TokenManagerConfig {
    /// Client credentials.
    pub credentials: ClientCredentials,
    /// Token endpoint URL (HTTPS only).
    pub token_endpoint: Url,
    /// Scopes to request; empty means no `scope` parameter.
    pub scopes: Vec<String>,
    /// Tokens are refreshed this long before their reported expiry.
    pub safety_margin: Duration,
    /// HTTP timeout for a single exchange attempt.
    pub request_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
}

impl TokenManagerConfig {
    /// Create a configuration with default tuning.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_endpoint: &str,
    ) -> Result<Self, ConfigurationError> {
        let config = Self {
            credentials: ClientCredentials::new(client_id, client_secret),
            token_endpoint: parse_endpoint(token_endpoint)?,
            scopes: Vec::new(),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every field. Called again at manager construction since all
    /// fields are public.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.credentials.validate()?;
        ensure_https(&self.token_endpoint)?;

        if self.request_timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "request_timeout must be greater than zero".to_string(),
            });
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigurationError::InvalidConfig {
                message: "retry base_delay must not exceed max_delay".to_string(),
            });
        }

        if let Some(scope) = self.scopes.iter().find(|s| !is_valid_scope(s)) {
            return Err(ConfigurationError::InvalidConfig {
                message: format!("invalid scope token: {scope:?}"),
            });
        }

        Ok(())
    }

    /// Scopes joined with spaces, or `None` when no scope is configured.
    pub fn scope_param(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(" "))
        }
    }
}

/// Parse an endpoint string and require the `https` scheme.
pub fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigurationError> {
    if endpoint.trim().is_empty() {
        return Err(ConfigurationError::MissingRequired {
            field: "token_endpoint".to_string(),
        });
    }

    let url = Url::parse(endpoint).map_err(|e| ConfigurationError::InvalidEndpoint {
        url: endpoint.to_string(),
        message: e.to_string(),
    })?;
    ensure_https(&url)?;
    Ok(url)
}

fn ensure_https(url: &Url) -> Result<(), ConfigurationError> {
    if url.scheme() != "https" {
        return Err(ConfigurationError::InsecureEndpoint {
            url: url.to_string(),
        });
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigurationError::InvalidEndpoint {
            url: url.to_string(),
            message: "missing host".to_string(),
        });
    }
    Ok(())
}

// RFC 6749 Section 3.3: scope-token = 1*( %x21 / %x23-5B / %x5D-7E )
fn is_valid_scope(scope: &str) -> bool {
    !scope.is_empty()
        && scope
            .bytes()
            .all(|b| b == 0x21 || (0x23..=0x5B).contains(&b) || (0x5D..=0x7E).contains(&b))
}

/// Client credentials for the client credentials grant.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: SecretString,
    /// Client authentication method.
    pub auth_method: ClientAuthMethod,
}

impl ClientCredentials {
    /// Create credentials using HTTP Basic authentication.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            auth_method: ClientAuthMethod::default(),
        }
    }

    /// Both halves must be non-empty and printable. The client ID must not
    /// contain `:` since it is the Basic credential separator.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_printable("client_id", &self.client_id)?;
        check_printable("client_secret", self.client_secret.expose_secret())?;

        if self.client_id.contains(':') {
            return Err(ConfigurationError::InvalidCredential {
                field: "client_id".to_string(),
                message: "must not contain ':'".to_string(),
            });
        }
        Ok(())
    }
}

fn check_printable(field: &str, value: &str) -> Result<(), ConfigurationError> {
    if value.is_empty() {
        return Err(ConfigurationError::MissingRequired {
            field: field.to_string(),
        });
    }
    if value.chars().any(char::is_control) {
        return Err(ConfigurationError::InvalidCredential {
            field: field.to_string(),
            message: "contains non-printable characters".to_string(),
        });
    }
    Ok(())
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Client authentication method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// HTTP Basic Authentication header.
    #[default]
    ClientSecretBasic,
    /// client_id and client_secret in request body.
    ClientSecretPost,
}
