//! Session context: the read model the UI layer consumes.
//!
//! Wraps [`AuthApi`](crate::api::AuthApi) with a stale-aware user cache,
//! the last user-facing message, and retry policies. Construct one per
//! front end and pass it around explicitly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::client::LungVisionClient;
use crate::error::{AuthErrorKind, AuthResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{
    DetailResponse, DoctorRegistration, MessageState, RefreshResponse, RegisterRequest,
    RegistrationResponse, ResearcherRegistration, Role, User,
};
use crate::validation;

/// Shown after a successful login.
pub const LOGIN_SUCCESS: &str = "Login successful! Welcome back.";

/// Shown after a successful legacy registration.
pub const REGISTER_SUCCESS: &str = "Registration successful! Please log in.";

/// Cache and retry tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a fetched user stays fresh.
    pub user_stale_after: Duration,
    pub query_retry: RetryPolicy,
    pub mutation_retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_stale_after: Duration::from_secs(300),
            query_retry: RetryPolicy::query(),
            mutation_retry: RetryPolicy::mutation(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedUser {
    user: User,
    fetched_at: Instant,
    invalidated: bool,
}

impl CachedUser {
    fn fresh(user: User) -> Self {
        Self {
            user,
            fetched_at: Instant::now(),
            invalidated: false,
        }
    }

    fn is_fresh(&self, window: Duration) -> bool {
        !self.invalidated && self.fetched_at.elapsed() < window
    }
}

/// Marks an operation as in flight for [`SessionContext::is_loading`].
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Authentication state plus the operations that change it.
#[derive(Debug)]
pub struct SessionContext {
    client: LungVisionClient,
    config: SessionConfig,
    cache: RwLock<Option<CachedUser>>,
    message: RwLock<Option<MessageState>>,
    in_flight: AtomicUsize,
}

impl SessionContext {
    pub fn new(client: LungVisionClient) -> Self {
        Self::with_config(client, SessionConfig::default())
    }

    pub fn with_config(client: LungVisionClient, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            cache: RwLock::new(None),
            message: RwLock::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Get the underlying client.
    pub fn client(&self) -> &LungVisionClient {
        &self.client
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    /// Cached user, fresh or not.
    ///
    /// Empty once the token store no longer holds a session, even when the
    /// session ended inside an unrelated request.
    pub fn user(&self) -> Option<User> {
        if !self.client.tokens().has_valid_tokens() {
            self.clear_cache();
            return None;
        }
        self.cache.read().as_ref().map(|c| c.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    /// Any fetch or mutation is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Outcome of the last user action.
    pub fn message(&self) -> Option<MessageState> {
        self.message.read().clone()
    }

    pub fn clear_message(&self) {
        *self.message.write() = None;
    }

    /// Mark the cached user stale; the next [`current_user`](Self::current_user)
    /// refetches.
    pub fn invalidate(&self) {
        if let Some(cached) = self.cache.write().as_mut() {
            cached.invalidated = true;
        }
    }

    fn seed(&self, user: User) {
        *self.cache.write() = Some(CachedUser::fresh(user));
    }

    fn clear_cache(&self) {
        *self.cache.write() = None;
    }

    fn set_message(&self, message: MessageState) {
        *self.message.write() = Some(message);
    }

    fn report<T>(&self, result: &AuthResult<T>, success: impl FnOnce(&T) -> String) {
        let message = match result {
            Ok(value) => MessageState::success(success(value)),
            Err(e) => MessageState::error(e.message.clone()),
        };
        self.set_message(message);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The authenticated user, from cache while fresh.
    ///
    /// Returns `Ok(None)` without any request when no tokens are held. A
    /// failed fetch empties the cache; a rejected session also clears the
    /// tokens.
    pub async fn current_user(&self) -> AuthResult<Option<User>> {
        if !self.client.tokens().has_valid_tokens() {
            self.clear_cache();
            return Ok(None);
        }
        if let Some(cached) = self.cache.read().as_ref()
            && cached.is_fresh(self.config.user_stale_after)
        {
            return Ok(Some(cached.user.clone()));
        }

        let _loading = InFlight::enter(&self.in_flight);
        let auth = self.client.auth();
        match with_retry(self.config.query_retry, "current_user", || auth.current_user()).await {
            Ok(user) => {
                self.seed(user.clone());
                Ok(Some(user))
            }
            Err(e) => {
                self.clear_cache();
                if e.status == Some(401) || e.kind == AuthErrorKind::SessionExpired {
                    self.client.tokens().clear();
                }
                tracing::debug!(error = %e, "Current user fetch failed");
                Err(e)
            }
        }
    }

    /// Ask the server whether the held access token is still valid.
    pub async fn verify(&self) -> bool {
        let _loading = InFlight::enter(&self.in_flight);
        self.client.auth().verify_token().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Log in and seed the cache with the returned user.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<User> {
        self.clear_message();
        let _loading = InFlight::enter(&self.in_flight);

        let auth = self.client.auth();
        let result = match validation::validate_login(email, password) {
            Ok(()) => {
                with_retry(self.config.mutation_retry, "login", || {
                    auth.login(email, password)
                })
                .await
            }
            Err(e) => Err(e),
        };
        self.complete_login(result.map(|r| r.user))
    }

    /// Log in through a role-specific portal.
    pub async fn login_as(&self, role: Role, email: &str, password: &str) -> AuthResult<User> {
        self.clear_message();
        let _loading = InFlight::enter(&self.in_flight);

        let auth = self.client.auth();
        let result = match validation::validate_login(email, password) {
            Ok(()) => {
                with_retry(self.config.mutation_retry, "login", || {
                    auth.login_as(role, email, password)
                })
                .await
            }
            Err(e) => Err(e),
        };
        self.complete_login(result.map(|r| r.user))
    }

    fn complete_login(&self, result: AuthResult<User>) -> AuthResult<User> {
        self.report(&result, |_| LOGIN_SUCCESS.to_string());
        match &result {
            Ok(user) => self.seed(user.clone()),
            Err(_) => self.clear_cache(),
        }
        result
    }

    /// Create an account through the legacy endpoint.
    pub async fn register(&self, request: &RegisterRequest) -> AuthResult<DetailResponse> {
        self.clear_message();
        let _loading = InFlight::enter(&self.in_flight);

        let auth = self.client.auth();
        let result = match validation::validate_registration(request) {
            Ok(()) => {
                with_retry(self.config.mutation_retry, "register", || {
                    auth.register(request)
                })
                .await
            }
            Err(e) => Err(e),
        };

        self.report(&result, |_| REGISTER_SUCCESS.to_string());
        if result.is_ok() {
            self.invalidate();
        }
        result
    }

    /// Submit doctor onboarding.
    pub async fn register_doctor(
        &self,
        registration: &DoctorRegistration,
    ) -> AuthResult<RegistrationResponse> {
        self.clear_message();
        let _loading = InFlight::enter(&self.in_flight);

        let auth = self.client.auth();
        let result = match validation::validate_doctor_registration(registration) {
            Ok(()) => {
                with_retry(self.config.mutation_retry, "register_doctor", || {
                    auth.register_doctor(registration)
                })
                .await
            }
            Err(e) => Err(e),
        };
        self.complete_registration(result)
    }

    /// Submit researcher onboarding.
    pub async fn register_researcher(
        &self,
        registration: &ResearcherRegistration,
    ) -> AuthResult<RegistrationResponse> {
        self.clear_message();
        let _loading = InFlight::enter(&self.in_flight);

        let auth = self.client.auth();
        let result = match validation::validate_researcher_registration(registration) {
            Ok(()) => {
                with_retry(self.config.mutation_retry, "register_researcher", || {
                    auth.register_researcher(registration)
                })
                .await
            }
            Err(e) => Err(e),
        };
        self.complete_registration(result)
    }

    fn complete_registration(
        &self,
        result: AuthResult<RegistrationResponse>,
    ) -> AuthResult<RegistrationResponse> {
        self.report(&result, |response| response.detail.clone());
        if let Ok(response) = &result {
            match (&response.tokens, &response.user) {
                (Some(_), Some(user)) => self.seed(user.clone()),
                _ => self.invalidate(),
            }
        }
        result
    }

    /// End the session. Cache, message and tokens are cleared whatever the
    /// server answers.
    pub async fn logout(&self) {
        let _loading = InFlight::enter(&self.in_flight);
        self.client.auth().logout().await;
        self.clear_cache();
        self.clear_message();
    }

    /// Refresh the access token explicitly.
    ///
    /// Success marks the cached user stale; failure empties the cache.
    pub async fn refresh(&self) -> AuthResult<RefreshResponse> {
        let _loading = InFlight::enter(&self.in_flight);
        let result = self.client.auth().refresh_token().await;
        match &result {
            Ok(_) => self.invalidate(),
            Err(e) => {
                tracing::warn!(error = %e, "Explicit token refresh failed");
                self.clear_cache();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(server: &MockServer) -> SessionContext {
        let client = LungVisionClient::builder()
            .base_url(format!("{}/api", server.uri()))
            .build()
            .unwrap();
        let config = SessionConfig {
            query_retry: RetryPolicy::query().with_base_delay(Duration::from_millis(1)),
            mutation_retry: RetryPolicy::mutation().with_base_delay(Duration::from_millis(1)),
            ..SessionConfig::default()
        };
        SessionContext::with_config(client, config)
    }

    fn me() -> serde_json::Value {
        json!({
            "id": 3,
            "email": "user@example.com",
            "full_name": "Sam Example",
            "role": "doctor"
        })
    }

    #[tokio::test]
    async fn test_current_user_without_tokens_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(me()))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = context(&server);
        assert_eq!(ctx.current_user().await.unwrap(), None);
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_current_user_is_cached_while_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(me()))
            .expect(2)
            .mount(&server)
            .await;

        let ctx = context(&server);
        ctx.client().tokens().set("A1", "R1");

        let first = ctx.current_user().await.unwrap().unwrap();
        let second = ctx.current_user().await.unwrap().unwrap();
        assert_eq!(first, second);
        assert!(ctx.is_authenticated());

        ctx.invalidate();
        ctx.current_user().await.unwrap();
    }

    #[tokio::test]
    async fn test_current_user_401_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server);
        ctx.client().tokens().set("A1", "R1");
        let err = ctx.current_user().await.unwrap_err();

        assert_eq!(err.kind, AuthErrorKind::SessionExpired);
        assert!(!ctx.client().tokens().has_valid_tokens());
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn test_current_user_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let ctx = context(&server);
        ctx.client().tokens().set("A1", "R1");
        let err = ctx.current_user().await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Server);
        // Server failures do not end the session.
        assert!(ctx.client().tokens().has_valid_tokens());
        assert!(!ctx.is_loading());
    }

    #[tokio::test]
    async fn test_login_invalid_input_sets_message() {
        let server = MockServer::start().await;
        let ctx = context(&server);

        let err = ctx.login("not-an-email", "Abc12345!").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::InvalidInput);
        let message = ctx.message().unwrap();
        assert_eq!(message.kind, MessageKind::Error);
        assert_eq!(message.text, "Please enter a valid email address");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_4xx_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let err = ctx.login("user@example.com", "Abc12345!").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::RateLimited);
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn test_login_5xx_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let err = ctx.login("user@example.com", "Abc12345!").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Server);
    }

    #[tokio::test]
    async fn test_register_success_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"detail": "ok"})))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let request = RegisterRequest::new("Sam Example", "user@example.com", "Abc12345!");
        ctx.register(&request).await.unwrap();

        assert_eq!(ctx.message(), Some(MessageState::success(REGISTER_SUCCESS)));
        ctx.clear_message();
        assert_eq!(ctx.message(), None);
    }

    #[tokio::test]
    async fn test_explicit_refresh_marks_user_stale() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(me()))
            .expect(2)
            .mount(&server)
            .await;

        let ctx = context(&server);
        ctx.client().tokens().set("A1", "R1");
        ctx.current_user().await.unwrap();

        let refreshed = ctx.refresh().await.unwrap();
        assert_eq!(refreshed.access, "A2");
        // Stale, but still shown until refetched.
        assert!(ctx.is_authenticated());
        ctx.current_user().await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_cache() {
        let server = MockServer::start().await;
        let ctx = context(&server);
        let err = ctx.refresh().await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::SessionExpired);
        assert!(ctx.user().is_none());
    }
}
