//! OAuth2 Client Credentials Token Manager
//!
//! Issues, caches and proactively refreshes bearer tokens obtained through
//! the client credentials grant (RFC 6749 Section 4.4).
//!
//! # Features
//!
//! - Expiry-aware caching with a configurable safety margin
//! - Single-flight refresh: concurrent callers share one token exchange
//! - Typed errors separating bad credentials from transient failures
//! - Bounded exponential backoff for server and network errors
//! - Explicit invalidation for resource servers that reject a token
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth2_token_manager::{token_manager_config, DefaultTokenManager, TokenManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = token_manager_config()
//!         .client_id("my-client-id")
//!         .client_secret("my-client-secret")
//!         .token_endpoint("https://provider.com/token")
//!         .add_scope("api:read")
//!         .build()?;
//!
//!     let manager = DefaultTokenManager::new(config)?;
//!
//!     let token = manager.get_token().await?;
//!     println!("Authorization: {}", token.authorization_header());
//!
//!     // After a resource server answers 401:
//!     manager.invalidate();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: configuration and token data structures
//! - `error`: error taxonomy and token endpoint response classification
//! - `core`: injected HTTP transport and clock
//! - `flows`: the client credentials exchange
//! - `resilience`: retry with exponential backoff
//! - `token`: the token manager
//! - `builders`: fluent configuration builder
//! - `client`: resource client with retry-once-on-401

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod flows;
pub mod resilience;
pub mod token;
pub mod types;

// Re-export client
pub use client::AuthorizedClient;

// Re-export builders
pub use builders::{token_manager_config, TokenManagerConfigBuilder};

// Re-export errors
pub use error::{
    create_error_from_response, get_user_message, parse_error_response, parse_retry_after,
    AuthError, AuthResult, ConfigurationError, NetworkError, OAuth2ErrorResponse,
};

// Re-export types
pub use types::{
    // Config
    ClientAuthMethod, ClientCredentials, TokenManagerConfig, DEFAULT_EXPIRES_IN_SECS,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SAFETY_MARGIN,
    // Token
    BearerToken, TokenRecord, TokenResponse, TokenStatus,
};

// Re-export core components
pub use crate::core::{
    // Transport
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport,
    ReqwestHttpTransport,
    // Clock
    Clock, MockClock, SystemClock,
};

// Re-export flows
pub use flows::ClientCredentialsFlow;

// Re-export token management
pub use token::{DefaultTokenManager, MockTokenManager, TokenManager};

// Re-export resilience
pub use resilience::{RetryConfig, RetryExecutor, RetryStats, DEFAULT_RETRY_CONFIG};
