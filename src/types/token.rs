//! Token Types
//!
//! Token endpoint response, the cached record and the values handed to callers.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

use crate::types::config::DEFAULT_EXPIRES_IN_SECS;

/// Token response from authorization server.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Reported lifetime, falling back to one hour when the provider omits it.
    pub fn lifetime_secs(&self) -> u64 {
        self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)
    }
}

/// The cached result of one successful exchange.
///
/// Records are replaced wholesale by the next exchange, never patched.
#[derive(Clone)]
pub struct TokenRecord {
    value: SecretString,
    /// Token type.
    pub token_type: String,
    /// When the exchange completed.
    pub issued_at: DateTime<Utc>,
    /// `issued_at` plus the reported lifetime.
    pub expires_at: DateTime<Utc>,
    /// Granted scopes, informational only.
    pub scope: Option<String>,
}

impl TokenRecord {
    /// Build a record from a token response received at `now`.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(response.lifetime_secs()).unwrap_or(i64::MAX);
        let expires_at = Duration::try_seconds(lifetime)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            value: SecretString::new(response.access_token),
            token_type: response.token_type,
            issued_at: now,
            expires_at,
            scope: response.scope,
        }
    }

    /// Valid iff `now < expires_at - safety_margin`.
    pub fn is_valid(&self, now: DateTime<Utc>, safety_margin: std::time::Duration) -> bool {
        let margin = Duration::from_std(safety_margin).unwrap_or(Duration::MAX);
        match self.expires_at.checked_sub_signed(margin) {
            Some(refresh_at) => now < refresh_at,
            None => false,
        }
    }

    /// Whole seconds until the hard expiry, clamped at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Reported lifetime of the token.
    pub fn lifetime(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    /// Token handed to callers.
    pub fn bearer(&self) -> BearerToken {
        BearerToken {
            value: self.value.clone(),
            token_type: self.token_type.clone(),
        }
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("value", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Bearer token wrapper for safe handling.
#[derive(Clone)]
pub struct BearerToken {
    value: SecretString,
    /// Token type.
    pub token_type: String,
}

impl BearerToken {
    /// Create a bearer token.
    pub fn new(value: String, token_type: String) -> Self {
        Self {
            value: SecretString::new(value),
            token_type,
        }
    }

    /// Get token value.
    pub fn secret(&self) -> &str {
        self.value.expose_secret()
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.value.expose_secret())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Read-only snapshot of the manager's cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenStatus {
    /// Whether a record is cached (fresh or stale).
    pub has_token: bool,
    /// Seconds until the hard expiry of the cached record.
    pub expires_in_seconds: Option<i64>,
    /// Scope granted with the cached record.
    pub scope: Option<String>,
}
