//! Authorized Client
//!
//! Sends resource requests with the current bearer token. When the resource
//! server rejects the token with 401, the cached token is invalidated and the
//! request is retried exactly once with a freshly issued one.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::error::AuthError;
use crate::token::TokenManager;

/// Resource client layered over a [`TokenManager`].
pub struct AuthorizedClient<M: TokenManager, T: HttpTransport> {
    tokens: Arc<M>,
    transport: Arc<T>,
}

impl<M: TokenManager, T: HttpTransport> AuthorizedClient<M, T> {
    /// Create new authorized client.
    pub fn new(tokens: Arc<M>, transport: Arc<T>) -> Self {
        Self { tokens, transport }
    }

    /// Token manager backing this client.
    pub fn tokens(&self) -> &Arc<M> {
        &self.tokens
    }

    /// Send a GET request.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, AuthError> {
        self.send(HttpRequest::new(HttpMethod::Get, url)).await
    }

    /// Send a request with an `Authorization` header.
    ///
    /// Responses other than 401 are returned as-is, whatever their status.
    /// A second 401 fails with [`AuthError::TokenRejected`].
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let mut retried = false;

        loop {
            let token = self.tokens.get_token().await?;

            let mut attempt = request.clone();
            attempt
                .headers
                .insert("authorization".to_string(), token.authorization_header());

            let response = self.transport.send(attempt).await?;
            if response.status != 401 {
                return Ok(response);
            }

            self.tokens.invalidate();

            if retried {
                warn!(url = %request.url, "Resource server rejected a freshly issued token");
                return Err(AuthError::TokenRejected);
            }

            debug!(url = %request.url, "Resource server rejected token; refreshing once");
            retried = true;
        }
    }
}
