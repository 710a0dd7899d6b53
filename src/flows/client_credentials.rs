//! Client Credentials Flow
//!
//! RFC 6749 Section 4.4 - Client Credentials Grant. One exchange attempt:
//! build the request, send it, classify the response.

use base64::Engine;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{Clock, HttpMethod, HttpRequest, HttpTransport};
use crate::error::{create_error_from_response, AuthError};
use crate::types::{ClientAuthMethod, TokenManagerConfig, TokenResponse};

/// Client Credentials Flow.
pub struct ClientCredentialsFlow<T: HttpTransport> {
    config: TokenManagerConfig,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
}

impl<T: HttpTransport> ClientCredentialsFlow<T> {
    /// Create new Client Credentials Flow.
    pub fn new(config: TokenManagerConfig, transport: Arc<T>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            transport,
            clock,
        }
    }

    /// Configuration this flow was built with.
    pub fn config(&self) -> &TokenManagerConfig {
        &self.config
    }

    fn build_request_body(&self) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", "client_credentials");

        if let Some(scope) = self.config.scope_param() {
            form.append_pair("scope", &scope);
        }

        // Client credentials in body if using post method
        if self.config.credentials.auth_method == ClientAuthMethod::ClientSecretPost {
            form.append_pair("client_id", &self.config.credentials.client_id);
            form.append_pair(
                "client_secret",
                self.config.credentials.client_secret.expose_secret(),
            );
        }

        form.finish()
    }

    fn build_request_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("accept".to_string(), "application/json".to_string());

        // Base64 here is the transport encoding required by the Basic
        // scheme, not a confidentiality mechanism; TLS provides that.
        if self.config.credentials.auth_method == ClientAuthMethod::ClientSecretBasic {
            let credentials = format!(
                "{}:{}",
                self.config.credentials.client_id,
                self.config.credentials.client_secret.expose_secret()
            );
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            headers.insert("authorization".to_string(), format!("Basic {}", encoded));
        }

        headers
    }

    /// Build the outbound token request.
    pub fn build_request(&self) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: self.config.token_endpoint.to_string(),
            headers: self.build_request_headers(),
            body: Some(self.build_request_body()),
            timeout: Some(self.config.request_timeout),
        }
    }

    /// Perform one exchange attempt.
    pub async fn request_token(&self) -> Result<TokenResponse, AuthError> {
        debug!(endpoint = %self.config.token_endpoint, "Requesting client credentials token");

        let response = self.transport.send(self.build_request()).await?;

        if response.status != 200 {
            let error = create_error_from_response(
                response.status,
                response.header("retry-after"),
                &response.body,
                self.clock.now(),
            );
            warn!(
                status = response.status,
                code = error.error_code(),
                error = %error,
                "Token endpoint returned an error"
            );
            return Err(error);
        }

        let token_response: TokenResponse =
            serde_json::from_str(&response.body).map_err(|e| AuthError::InvalidResponse {
                message: e.to_string(),
            })?;

        if token_response.access_token.is_empty() {
            return Err(AuthError::InvalidResponse {
                message: "access_token is empty".to_string(),
            });
        }

        Ok(token_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HttpResponse, MockHttpTransport, SystemClock};
    use crate::error::NetworkError;
    use std::time::Duration;

    fn flow(transport: Arc<MockHttpTransport>) -> ClientCredentialsFlow<MockHttpTransport> {
        let config =
            TokenManagerConfig::new("abc123", "xyz789", "https://example.test/token").unwrap();
        ClientCredentialsFlow::new(config, transport, Arc::new(SystemClock))
    }

    #[test]
    fn test_request_uses_basic_auth_and_form_body() {
        let flow = flow(Arc::new(MockHttpTransport::new()));
        let request = flow.build_request();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://example.test/token");
        // base64("abc123:xyz789")
        assert_eq!(
            request.header("Authorization"),
            Some("Basic YWJjMTIzOnh5ejc4OQ==")
        );
        assert_eq!(
            request.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.body.as_deref(), Some("grant_type=client_credentials"));
        assert_eq!(request.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_request_includes_scope() {
        let mut config =
            TokenManagerConfig::new("abc123", "xyz789", "https://example.test/token").unwrap();
        config.scopes = vec!["read".to_string(), "write".to_string()];
        let flow = ClientCredentialsFlow::new(
            config,
            Arc::new(MockHttpTransport::new()),
            Arc::new(SystemClock),
        );

        assert_eq!(
            flow.build_request().body.as_deref(),
            Some("grant_type=client_credentials&scope=read+write")
        );
    }

    #[test]
    fn test_client_secret_post_moves_credentials_to_body() {
        let mut config =
            TokenManagerConfig::new("abc123", "xyz789", "https://example.test/token").unwrap();
        config.credentials.auth_method = ClientAuthMethod::ClientSecretPost;
        let flow = ClientCredentialsFlow::new(
            config,
            Arc::new(MockHttpTransport::new()),
            Arc::new(SystemClock),
        );

        let request = flow.build_request();
        assert!(request.header("authorization").is_none());
        assert_eq!(
            request.body.as_deref(),
            Some("grant_type=client_credentials&client_id=abc123&client_secret=xyz789")
        );
    }

    #[tokio::test]
    async fn test_request_token_success() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            200,
            serde_json::json!({
                "access_token": "T1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "read"
            }),
        );

        let response = flow(transport.clone()).request_token().await.unwrap();
        assert_eq!(response.access_token, "T1");
        assert_eq!(response.expires_in, Some(3600));
        assert_eq!(response.scope.as_deref(), Some("read"));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_request_token_classifies_errors() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_response(HttpResponse::new(400, r#"{"error":"invalid_request"}"#))
            .queue_response(HttpResponse::new(401, ""))
            .queue_response(HttpResponse::new(429, "").with_header("Retry-After", "12"))
            .queue_response(HttpResponse::new(503, "unavailable"))
            .queue_response(HttpResponse::new(418, ""))
            .queue_error(NetworkError::ConnectionFailed {
                message: "refused".to_string(),
            })
            .queue_response(HttpResponse::new(200, "not json"));
        let flow = flow(transport);

        assert_eq!(
            flow.request_token().await.unwrap_err(),
            AuthError::BadRequest {
                detail: r#"{"error":"invalid_request"}"#.to_string()
            }
        );
        assert!(matches!(
            flow.request_token().await,
            Err(AuthError::InvalidCredentials { status: 401, .. })
        ));
        assert_eq!(
            flow.request_token().await.unwrap_err().retry_after(),
            Some(Duration::from_secs(12))
        );
        assert!(matches!(
            flow.request_token().await,
            Err(AuthError::ServerError { status: 503, .. })
        ));
        assert_eq!(
            flow.request_token().await.unwrap_err(),
            AuthError::Unexpected { status: 418 }
        );
        assert!(matches!(
            flow.request_token().await,
            Err(AuthError::Network(NetworkError::ConnectionFailed { .. }))
        ));
        assert!(matches!(
            flow.request_token().await,
            Err(AuthError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_request_token_rejects_empty_access_token() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_token("", 3600);

        assert!(matches!(
            flow(transport).request_token().await,
            Err(AuthError::InvalidResponse { .. })
        ));
    }
}
