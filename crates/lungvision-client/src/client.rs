//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{AuthApi, PredictApi};
use crate::error::{Error, Result};
use crate::interceptor::{RefreshInterceptor, RefreshState};
use crate::token_store::{SharedTokenStore, TokenStorage, TokenStore};
use crate::transport::{ApiRequest, DEFAULT_TIMEOUT, Transport, decode};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Default timeout for archive uploads.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Lung Vision API client.
///
/// Cheap to clone; clones share the token store and the refresh gate.
///
/// # Example
///
/// ```no_run
/// use lungvision_client::LungVisionClient;
///
/// # async fn example() -> Result<(), lungvision_client::AuthError> {
/// let client = LungVisionClient::builder()
///     .base_url("http://localhost:8000/api")
///     .build()
///     .expect("valid base URL");
///
/// let login = client.auth().login("user@example.com", "Abc12345!").await?;
/// println!("Logged in as {}", login.user.full_name);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LungVisionClient {
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
#[derive(Debug)]
pub(crate) struct ClientInner {
    pub(crate) interceptor: RefreshInterceptor,
    pub(crate) upload_timeout: Duration,
}

impl LungVisionClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client with default settings pointing to localhost.
    pub fn localhost() -> Result<Self> {
        Self::builder().base_url(DEFAULT_BASE_URL).build()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        self.inner.interceptor.transport().base_url()
    }

    /// Get the token store.
    pub fn tokens(&self) -> &SharedTokenStore {
        self.inner.interceptor.tokens()
    }

    /// Whether a refresh cycle is in flight.
    pub fn refresh_state(&self) -> RefreshState {
        self.inner.interceptor.state()
    }

    /// Number of refresh calls issued by this client.
    pub fn refresh_calls(&self) -> u64 {
        self.inner.interceptor.refresh_calls()
    }

    pub(crate) fn interceptor(&self) -> &RefreshInterceptor {
        &self.inner.interceptor
    }

    pub(crate) fn upload_timeout(&self) -> Duration {
        self.inner.upload_timeout
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the authentication API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    /// Access the prediction API.
    pub fn predict(&self) -> PredictApi {
        PredictApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Send through the refresh interceptor and decode the body.
    pub(crate) async fn send<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let body = self.send_raw(request).await?;
        decode(&body)
    }

    /// Send through the refresh interceptor.
    pub(crate) async fn send_raw(&self, request: &ApiRequest) -> Result<Bytes> {
        self.inner.interceptor.send(request).await
    }

    /// Send without a bearer token and without refresh handling.
    pub(crate) async fn send_anonymous<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T> {
        let body = self.inner.interceptor.transport().execute(request, None).await?;
        decode(&body)
    }
}

/// Builder for creating a LungVisionClient.
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    upload_timeout: Duration,
    user_agent: Option<String>,
    storage: Option<Arc<dyn TokenStorage>>,
    tokens: Option<SharedTokenStore>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            user_agent: None,
            storage: None,
            tokens: None,
        }
    }

    /// Set the base URL for the API.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the archive upload timeout.
    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Persist tokens through this backend. The store is primed from it
    /// when the client is built.
    pub fn token_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Share an existing token store. Takes precedence over
    /// [`token_storage`](Self::token_storage).
    pub fn token_store(mut self, tokens: SharedTokenStore) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<LungVisionClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("lungvision-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        let tokens = match (self.tokens, self.storage) {
            (Some(tokens), _) => tokens,
            (None, Some(storage)) => Arc::new(TokenStore::load(storage)),
            (None, None) => Arc::new(TokenStore::in_memory()),
        };

        let transport = Transport::new(http, base_url, self.timeout);
        Ok(LungVisionClient {
            inner: Arc::new(ClientInner {
                interceptor: RefreshInterceptor::new(transport, tokens),
                upload_timeout: self.upload_timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::{MemoryTokenStorage, PersistedTokens};

    #[test]
    fn test_builder_requires_base_url() {
        let result = ClientBuilder::new().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let result = ClientBuilder::new().base_url("not a url").build();
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8000/api")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");

        let client = ClientBuilder::new()
            .base_url("http://localhost:8000/api/")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
    }

    #[test]
    fn test_localhost_defaults() {
        let client = LungVisionClient::localhost().unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
        assert_eq!(client.upload_timeout(), DEFAULT_UPLOAD_TIMEOUT);
        assert_eq!(client.refresh_state(), RefreshState::Normal);
        assert!(!client.tokens().has_valid_tokens());
    }

    #[test]
    fn test_builder_primes_from_storage() {
        let storage = Arc::new(MemoryTokenStorage::with_tokens(PersistedTokens {
            access: Some("A1".into()),
            refresh: Some("R1".into()),
        }));
        let client = ClientBuilder::new()
            .base_url(DEFAULT_BASE_URL)
            .token_storage(storage)
            .build()
            .unwrap();
        assert_eq!(client.tokens().access().as_deref(), Some("A1"));
    }

    #[test]
    fn test_clones_share_tokens() {
        let client = LungVisionClient::localhost().unwrap();
        let clone = client.clone();
        client.tokens().set("A1", "R1");
        assert!(clone.tokens().has_valid_tokens());
    }
}
