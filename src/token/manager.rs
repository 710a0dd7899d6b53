//! Token Manager
//!
//! Caches the current client credentials token, refreshes it lazily once it
//! falls inside the safety margin, and collapses concurrent refreshes into a
//! single exchange.
//!
//! The manager is a two-state machine: *Empty* (no record) and *Holding* (a
//! record, fresh or stale). Only a successful exchange moves it to Holding;
//! only [`TokenManager::invalidate`] moves it back to Empty. Staleness is
//! evaluated at call time, there is no background timer.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

use crate::core::{
    Clock, HttpTransport, ReqwestHttpTransport, SystemClock, DEFAULT_MAX_RESPONSE_SIZE,
};
use crate::error::{AuthError, ConfigurationError};
use crate::flows::ClientCredentialsFlow;
use crate::resilience::{RetryExecutor, RetryStats};
use crate::types::{BearerToken, TokenManagerConfig, TokenRecord, TokenResponse, TokenStatus};

/// Token manager interface.
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Get a token that is valid now, exchanging credentials if necessary.
    async fn get_token(&self) -> Result<BearerToken, AuthError>;

    /// Drop the cached token so the next [`get_token`](Self::get_token)
    /// issues a new one. Call this when a resource server answers 401.
    fn invalidate(&self);

    /// Read-only view of the cache.
    fn token_info(&self) -> TokenStatus;
}

type SharedExchange = Shared<BoxFuture<'static, Result<TokenRecord, AuthError>>>;

#[derive(Default)]
struct State {
    current: Option<TokenRecord>,
    in_flight: Option<SharedExchange>,
}

struct Inner<T: HttpTransport> {
    flow: ClientCredentialsFlow<T>,
    retry: RetryExecutor,
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
    state: Mutex<State>,
}

/// Clears the in-flight slot when the exchange task ends, including by panic.
struct InFlightGuard<'a> {
    state: &'a Mutex<State>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight = None;
    }
}

impl<T: HttpTransport + 'static> Inner<T> {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the exchange so that a cancelled waiter cannot cancel it for
    /// the others.
    fn start_exchange(this: &Arc<Self>) -> SharedExchange {
        let inner = Arc::clone(this);
        let handle = tokio::spawn(async move { inner.run_exchange().await });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(AuthError::Aborted {
                    message: e.to_string(),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn run_exchange(&self) -> Result<TokenRecord, AuthError> {
        let _guard = InFlightGuard { state: &self.state };

        let response = match self.retry.execute(|| self.flow.request_token()).await {
            Ok(response) => response,
            Err(error) => {
                warn!(code = error.error_code(), error = %error, "Token exchange failed");
                return Err(error);
            }
        };

        let record = self.store(response);
        Ok(record)
    }

    fn store(&self, response: TokenResponse) -> TokenRecord {
        let record = TokenRecord::from_response(response, self.clock.now());

        if !record.is_valid(record.issued_at, self.safety_margin) {
            warn!(
                lifetime_secs = record.lifetime().num_seconds(),
                safety_margin_secs = self.safety_margin.as_secs(),
                "Token lifetime does not exceed the safety margin; every call will refresh"
            );
        }

        info!(
            token_type = %record.token_type,
            expires_in = record.lifetime().num_seconds(),
            scope = record.scope.as_deref().unwrap_or(""),
            "Access token acquired"
        );

        self.lock_state().current = Some(record.clone());
        record
    }
}

/// Default token manager implementation.
///
/// Cheap to clone; clones share one cache.
pub struct DefaultTokenManager<T: HttpTransport + 'static = ReqwestHttpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: HttpTransport + 'static> Clone for DefaultTokenManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DefaultTokenManager<ReqwestHttpTransport> {
    /// Create a token manager backed by reqwest.
    pub fn new(config: TokenManagerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let transport =
            ReqwestHttpTransport::with_options(config.request_timeout, DEFAULT_MAX_RESPONSE_SIZE)?;
        Self::with_transport(config, Arc::new(transport))
    }
}

impl<T: HttpTransport + 'static> DefaultTokenManager<T> {
    /// Create a token manager over an injected transport.
    pub fn with_transport(
        config: TokenManagerConfig,
        transport: Arc<T>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_components(config, transport, Arc::new(SystemClock))
    }

    /// Create a token manager over an injected transport and clock.
    pub fn with_components(
        config: TokenManagerConfig,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;

        debug!(
            client_id = %config.credentials.client_id,
            endpoint = %config.token_endpoint,
            safety_margin_secs = config.safety_margin.as_secs(),
            "Token manager created"
        );

        let retry = RetryExecutor::new(config.retry.clone());
        let safety_margin = config.safety_margin;

        Ok(Self {
            inner: Arc::new(Inner {
                flow: ClientCredentialsFlow::new(config, transport, Arc::clone(&clock)),
                retry,
                clock,
                safety_margin,
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Configuration the manager was built with.
    pub fn config(&self) -> &TokenManagerConfig {
        self.inner.flow.config()
    }

    /// Cumulative exchange attempt counters.
    pub fn retry_stats(&self) -> RetryStats {
        self.inner.retry.get_stats()
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> TokenManager for DefaultTokenManager<T> {
    #[instrument(skip(self))]
    async fn get_token(&self) -> Result<BearerToken, AuthError> {
        // Check-and-join-or-start runs under one lock; no await while held.
        let exchange = {
            let mut state = self.inner.lock_state();
            let now = self.inner.clock.now();

            if let Some(record) = state
                .current
                .as_ref()
                .filter(|record| record.is_valid(now, self.inner.safety_margin))
            {
                trace!("Serving cached access token");
                return Ok(record.bearer());
            }

            if let Some(exchange) = state.in_flight.clone() {
                debug!("Joining in-flight token exchange");
                exchange
            } else {
                debug!(stale = state.current.is_some(), "Starting token exchange");
                let exchange = Inner::start_exchange(&self.inner);
                state.in_flight = Some(exchange.clone());
                exchange
            }
        };

        exchange.await.map(|record| record.bearer())
    }

    fn invalidate(&self) {
        if self.inner.lock_state().current.take().is_some() {
            debug!("Cached access token invalidated");
        }
    }

    fn token_info(&self) -> TokenStatus {
        let state = self.inner.lock_state();
        match &state.current {
            Some(record) => TokenStatus {
                has_token: true,
                expires_in_seconds: Some(record.remaining_secs(self.inner.clock.now())),
                scope: record.scope.clone(),
            },
            None => TokenStatus::default(),
        }
    }
}

/// Mock token manager for testing.
#[derive(Default)]
pub struct MockTokenManager {
    tokens: Mutex<VecDeque<Result<BearerToken, AuthError>>>,
    current: Mutex<Option<BearerToken>>,
    get_token_calls: AtomicUsize,
    invalidate_calls: AtomicUsize,
}

impl MockTokenManager {
    /// Create new mock token manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next exchange.
    pub fn queue_token(&self, value: &str) -> &Self {
        let token = BearerToken::new(value.to_string(), "Bearer".to_string());
        lock(&self.tokens).push_back(Ok(token));
        self
    }

    /// Queue a failing exchange.
    pub fn queue_error(&self, error: AuthError) -> &Self {
        lock(&self.tokens).push_back(Err(error));
        self
    }

    /// Number of `get_token` calls.
    pub fn get_token_count(&self) -> usize {
        self.get_token_calls.load(Ordering::SeqCst)
    }

    /// Number of `invalidate` calls.
    pub fn invalidate_count(&self) -> usize {
        self.invalidate_calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TokenManager for MockTokenManager {
    async fn get_token(&self) -> Result<BearerToken, AuthError> {
        self.get_token_calls.fetch_add(1, Ordering::SeqCst);

        let mut current = lock(&self.current);
        if let Some(token) = current.as_ref() {
            return Ok(token.clone());
        }

        let next = lock(&self.tokens).pop_front().ok_or_else(|| AuthError::Aborted {
            message: "No mock token available".to_string(),
        })??;
        *current = Some(next.clone());
        Ok(next)
    }

    fn invalidate(&self) {
        self.invalidate_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.current) = None;
    }

    fn token_info(&self) -> TokenStatus {
        TokenStatus {
            has_token: lock(&self.current).is_some(),
            ..Default::default()
        }
    }
}
