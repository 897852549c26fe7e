//! Silent token refresh on 401.
//!
//! A request that fails with 401 (and is neither an auth endpoint nor a
//! replay) triggers one refresh-and-replay cycle. Refresh cycles are
//! serialized through a single gate: when several requests fail at once,
//! the first to take the gate performs the refresh and the rest find the
//! access token already rotated and replay with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, RequestBody, Transport, decode};
use crate::types::RefreshResponse;

/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "token/refresh/";

/// Observable refresh machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Normal,
    Refreshing,
}

/// A request travelling through the interceptor, with its one-shot flag.
#[derive(Debug, Clone, Copy)]
pub struct Attempt<'a> {
    pub request: &'a ApiRequest,
    pub retried: bool,
}

impl<'a> Attempt<'a> {
    fn first(request: &'a ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    fn replay(self) -> Self {
        Self {
            retried: true,
            ..self
        }
    }
}

/// Endpoints whose 401s are surfaced directly (login, registration,
/// refresh itself).
pub fn is_auth_endpoint(route: &str) -> bool {
    let route = route.trim_start_matches('/');
    let route = route.split('?').next().unwrap_or(route);
    route == REFRESH_PATH || route.ends_with("login/") || route.ends_with("register/")
}

/// Transport wrapper that recovers from expired access tokens.
#[derive(Debug)]
pub struct RefreshInterceptor {
    transport: Transport,
    tokens: Arc<TokenStore>,
    refresh_gate: Mutex<()>,
    refresh_calls: AtomicU64,
}

impl RefreshInterceptor {
    pub fn new(transport: Transport, tokens: Arc<TokenStore>) -> Self {
        Self {
            transport,
            tokens,
            refresh_gate: Mutex::new(()),
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Get the token store.
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Current machine state.
    pub fn state(&self) -> RefreshState {
        match self.refresh_gate.try_lock() {
            Ok(_) => RefreshState::Normal,
            Err(_) => RefreshState::Refreshing,
        }
    }

    /// Number of refresh calls issued to the server so far.
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Send a request with the current access token, refreshing and
    /// replaying once on 401.
    ///
    /// When the refresh is impossible or rejected, the caller receives the
    /// original 401, not the refresh failure.
    pub async fn send(&self, request: &ApiRequest) -> Result<Bytes> {
        let mut attempt = Attempt::first(request);
        let mut bearer = self.tokens.access();

        loop {
            let error = match self.transport.execute(attempt.request, bearer.as_deref()).await {
                Err(error) if Self::should_refresh(&attempt, &error) => error,
                outcome => return outcome,
            };

            match self.recover(bearer.as_deref()).await {
                Some(access) => {
                    tracing::debug!(path = %request.route(), "Replaying request with refreshed token");
                    attempt = attempt.replay();
                    bearer = Some(access);
                }
                None => return Err(error),
            }
        }
    }

    /// A request carrying its own `Authorization` header is never recovered:
    /// the replay would send the same rejected credential.
    fn should_refresh(attempt: &Attempt<'_>, error: &Error) -> bool {
        error.is_unauthorized()
            && !attempt.retried
            && !attempt.request.has_authorization()
            && !is_auth_endpoint(attempt.request.route())
    }

    /// Obtain a usable access token after `failed_with` was rejected.
    async fn recover(&self, failed_with: Option<&str>) -> Option<String> {
        let _gate = self.refresh_gate.lock().await;

        // Another cycle finished while this request waited for the gate.
        if let Some(current) = self.tokens.access()
            && failed_with != Some(current.as_str())
        {
            tracing::debug!("Access token already rotated; skipping refresh");
            return Some(current);
        }

        match self.refresh_locked().await {
            Ok(Some(refreshed)) => Some(refreshed.access),
            Ok(None) => {
                tracing::debug!("No refresh token held; surfacing original 401");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; session cleared");
                None
            }
        }
    }

    /// Exchange the held refresh token for a new access token.
    ///
    /// `Ok(None)` means no session was held (or it was cleared while the
    /// call was in flight). A rejected refresh clears the token store.
    pub async fn refresh(&self) -> Result<Option<RefreshResponse>> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<Option<RefreshResponse>> {
        let Some(refresh) = self.tokens.refresh() else {
            return Ok(None);
        };

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut request = ApiRequest::post(REFRESH_PATH);
        request.body = RequestBody::Json(json!({ "refresh": refresh }));

        let outcome = self
            .transport
            .execute(&request, None)
            .await
            .and_then(|body| decode::<RefreshResponse>(&body));

        match outcome {
            Ok(refreshed) => {
                if !self
                    .tokens
                    .rotate(&refreshed.access, refreshed.refresh.as_deref())
                {
                    tracing::warn!("Session ended during refresh; discarding new tokens");
                    return Ok(None);
                }
                tracing::info!(rotated = refreshed.refresh.is_some(), "Access token refreshed");
                Ok(Some(refreshed))
            }
            Err(e) => {
                self.tokens.clear();
                Err(e)
            }
        }
    }
}
