//! Token Manager Error Types
//!
//! Construction failures, token acquisition failures and transport failures
//! are kept as separate types so callers can tell "fix my configuration"
//! apart from "try again later".

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Invalid construction input. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid {field}: {message}")]
    InvalidCredential { field: String, message: String },

    #[error("Invalid endpoint URL {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("Token endpoint must use HTTPS: {url}")]
    InsecureEndpoint { url: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Failure to obtain a token.
///
/// `Clone` so that every caller waiting on a shared exchange receives the
/// identical error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token request rejected as malformed: {detail}")]
    BadRequest { detail: String },

    #[error("Invalid client credentials (HTTP {status})")]
    InvalidCredentials { status: u16, detail: String },

    #[error("Rate limited by token endpoint")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Token endpoint server error (HTTP {status})")]
    ServerError { status: u16, detail: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Unexpected response from token endpoint (HTTP {status})")]
    Unexpected { status: u16 },

    #[error("Invalid token response: {message}")]
    InvalidResponse { message: String },

    #[error("Resource server rejected a freshly issued token")]
    TokenRejected,

    #[error("Token exchange aborted: {message}")]
    Aborted { message: String },
}

impl AuthError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "AUTH_BAD_REQUEST",
            Self::InvalidCredentials { .. } => "AUTH_INVALID_CREDENTIALS",
            Self::RateLimited { .. } => "AUTH_RATE_LIMITED",
            Self::ServerError { .. } => "AUTH_SERVER_ERROR",
            Self::Network(_) => "AUTH_NETWORK",
            Self::Unexpected { .. } => "AUTH_UNEXPECTED",
            Self::InvalidResponse { .. } => "AUTH_INVALID_RESPONSE",
            Self::TokenRejected => "AUTH_TOKEN_REJECTED",
            Self::Aborted { .. } => "AUTH_ABORTED",
        }
    }

    /// Whether the token manager retries this error internally.
    ///
    /// Rate limiting is left to the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServerError { .. } => true,
            Self::Network(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Retry-after hint, if the token endpoint sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Errors that will not go away by retrying and need an operator.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. } | Self::BadRequest { .. }
        )
    }
}

/// Network/transport error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("DNS resolution failed: {host}")]
    DnsResolutionFailed { host: String },

    #[error("TLS error: {message}")]
    TlsError { message: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Failed to read response body: {message}")]
    InvalidBody { message: String },
}

impl NetworkError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::TlsError { .. } | Self::ResponseTooLarge { .. } | Self::InvalidBody { .. }
        )
    }
}

/// Result type for token operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// OAuth2 error response body (RFC 6749 Section 5.2).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Best human-readable detail for a failed response: the OAuth2
/// `error_description` / `error` when the body carries one, the raw body
/// otherwise.
fn error_detail(body: &str) -> String {
    match parse_error_response(body) {
        Some(response) => match response.error_description {
            Some(description) => format!("{}: {}", response.error, description),
            None => response.error,
        },
        None => body.trim().to_string(),
    }
}

/// Parse a `Retry-After` header value.
///
/// Accepts delta-seconds or an HTTP-date; a date in the past yields zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Classify a non-200 token endpoint response.
pub fn create_error_from_response(
    status: u16,
    retry_after: Option<&str>,
    body: &str,
    now: DateTime<Utc>,
) -> AuthError {
    match status {
        400 => AuthError::BadRequest {
            detail: body.to_string(),
        },
        401 | 403 => AuthError::InvalidCredentials {
            status,
            detail: error_detail(body),
        },
        429 => AuthError::RateLimited {
            retry_after: retry_after.and_then(|v| parse_retry_after(v, now)),
        },
        s if s >= 500 => AuthError::ServerError {
            status,
            detail: error_detail(body),
        },
        _ => AuthError::Unexpected { status },
    }
}

/// Get user-friendly error message.
pub fn get_user_message(error: &AuthError) -> String {
    match error {
        AuthError::InvalidCredentials { .. } => {
            "The service credentials were rejected. Check the client ID and secret.".to_string()
        }
        AuthError::BadRequest { .. } => {
            "The token request was rejected as malformed. Check the client configuration."
                .to_string()
        }
        AuthError::RateLimited {
            retry_after: Some(wait),
        } => format!(
            "Too many token requests. Please wait {} seconds and try again.",
            wait.as_secs()
        ),
        AuthError::RateLimited { retry_after: None } => {
            "Too many token requests. Please wait a moment and try again.".to_string()
        }
        AuthError::Network(NetworkError::Timeout { .. }) => {
            "The token request timed out. Please check your connection and try again.".to_string()
        }
        AuthError::ServerError { .. } | AuthError::Network(_) => {
            "The authentication service is temporarily unavailable. Please try again later."
                .to_string()
        }
        _ => "An authentication error occurred. Please try again.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(AuthError::ServerError {
            status: 503,
            detail: String::new()
        }
        .is_retryable());
        assert!(AuthError::Network(NetworkError::Timeout {
            timeout: Duration::from_secs(10)
        })
        .is_retryable());
        assert!(!AuthError::Network(NetworkError::TlsError {
            message: "bad cert".to_string()
        })
        .is_retryable());
        assert!(!AuthError::Network(NetworkError::InvalidBody {
            message: "truncated".to_string()
        })
        .is_retryable());
        assert!(
            !AuthError::Network(NetworkError::ResponseTooLarge { size: 2_000_000 }).is_retryable()
        );
        assert!(!AuthError::InvalidCredentials {
            status: 401,
            detail: String::new()
        }
        .is_retryable());
        assert!(!AuthError::RateLimited { retry_after: None }.is_retryable());
    }

    #[test]
    fn test_classify_status_codes() {
        let body =
            r#"{"error":"unsupported_grant_type","error_description":"bad grant","trace":"abc"}"#;
        match create_error_from_response(400, None, body, now()) {
            AuthError::BadRequest { detail } => assert_eq!(detail, body),
            other => panic!("unexpected error: {other:?}"),
        }

        match create_error_from_response(401, None, body, now()) {
            AuthError::InvalidCredentials { detail, .. } => {
                assert_eq!(detail, "unsupported_grant_type: bad grant")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            create_error_from_response(401, None, "", now()),
            AuthError::InvalidCredentials { status: 401, .. }
        ));
        assert!(matches!(
            create_error_from_response(403, None, "", now()),
            AuthError::InvalidCredentials { status: 403, .. }
        ));
        assert!(matches!(
            create_error_from_response(502, None, "bad gateway", now()),
            AuthError::ServerError { status: 502, .. }
        ));
        assert_eq!(
            create_error_from_response(302, None, "", now()),
            AuthError::Unexpected { status: 302 }
        );
    }

    #[test]
    fn test_rate_limited_retry_after() {
        let error = create_error_from_response(429, Some("30"), "", now());
        assert_eq!(error.retry_after(), Some(Duration::from_secs(30)));

        let error = create_error_from_response(429, None, "", now());
        assert_eq!(error, AuthError::RateLimited { retry_after: None });
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let value = "Mon, 01 Jan 2024 12:01:30 GMT";
        assert_eq!(
            parse_retry_after(value, now()),
            Some(Duration::from_secs(90))
        );

        let past = "Mon, 01 Jan 2024 11:00:00 GMT";
        assert_eq!(parse_retry_after(past, now()), Some(Duration::ZERO));

        assert_eq!(parse_retry_after("soon", now()), None);
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"error":"invalid_client","error_description":"Unknown client"}"#;
        let response = parse_error_response(body).unwrap();
        assert_eq!(response.error, "invalid_client");
        assert_eq!(
            response.error_description,
            Some("Unknown client".to_string())
        );
    }

    #[test]
    fn test_needs_operator() {
        assert!(AuthError::InvalidCredentials {
            status: 401,
            detail: String::new()
        }
        .needs_operator());
        assert!(!AuthError::RateLimited { retry_after: None }.needs_operator());
    }
}
