//! Authentication API.

use serde_json::json;

use crate::client::LungVisionClient;
use crate::error::{AuthError, AuthErrorKind, AuthResult, Error};
use crate::normalize::{ErrorContext, SESSION_EXPIRED, normalize};
use crate::transport::ApiRequest;
use crate::types::{
    DetailResponse, DoctorRegistration, LoginRequest, LoginResponse, RefreshResponse,
    RegisterRequest, RegistrationResponse, ResearcherRegistration, Role, User,
};

/// Authentication API client.
///
/// Every operation returns a normalized [`AuthError`] whose message is fit
/// for display.
pub struct AuthApi {
    client: LungVisionClient,
}

impl AuthApi {
    pub(crate) fn new(client: LungVisionClient) -> Self {
        Self { client }
    }

    /// Create an account through the legacy endpoint. No tokens are issued.
    pub async fn register(&self, request: &RegisterRequest) -> AuthResult<DetailResponse> {
        let request = ApiRequest::post("register/")
            .json(request)
            .map_err(credentials)?;
        self.client.send(&request).await.map_err(credentials)
    }

    /// Submit doctor onboarding. Tokens, when the server issues them, are
    /// stored immediately.
    pub async fn register_doctor(
        &self,
        registration: &DoctorRegistration,
    ) -> AuthResult<RegistrationResponse> {
        let request = ApiRequest::post("auth/doctor/register/").multipart(registration.to_form());
        self.register_with_profile(&request).await
    }

    /// Submit researcher onboarding. Tokens, when the server issues them,
    /// are stored immediately.
    pub async fn register_researcher(
        &self,
        registration: &ResearcherRegistration,
    ) -> AuthResult<RegistrationResponse> {
        let request =
            ApiRequest::post("auth/researcher/register/").multipart(registration.to_form());
        self.register_with_profile(&request).await
    }

    async fn register_with_profile(
        &self,
        request: &ApiRequest,
    ) -> AuthResult<RegistrationResponse> {
        let response: RegistrationResponse =
            self.client.send(request).await.map_err(credentials)?;

        if let Some(tokens) = &response.tokens {
            self.client.tokens().set(&tokens.access, &tokens.refresh);
            tracing::info!(path = %request.route(), "Registration issued a session");
        }
        Ok(response)
    }

    /// Exchange credentials for a token pair and store it.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse> {
        let request = ApiRequest::post("login/")
            .json(&LoginRequest { email, password })
            .map_err(credentials)?;
        let response: LoginResponse = self.client.send(&request).await.map_err(credentials)?;

        self.client.tokens().set(&response.access, &response.refresh);
        tracing::info!(role = %response.user.role, "Login succeeded");
        Ok(response)
    }

    /// Log in through a role-specific portal.
    ///
    /// An account of another role is logged out again at once and the call
    /// fails with [`AuthErrorKind::RoleMismatch`].
    pub async fn login_as(
        &self,
        role: Role,
        email: &str,
        password: &str,
    ) -> AuthResult<LoginResponse> {
        let response = self.login(email, password).await?;
        if response.user.role == role {
            return Ok(response);
        }

        tracing::info!(expected = %role, actual = %response.user.role, "Role mismatch at login");
        self.logout().await;
        Err(role_mismatch(response.user.role))
    }

    /// Best-effort server-side invalidation, then clear the local session.
    ///
    /// Never fails: the token store is empty afterwards whatever the server
    /// said.
    pub async fn logout(&self) {
        if let Some(refresh) = self.client.tokens().refresh() {
            let request = ApiRequest::post("token/logout/")
                .json(&json!({ "refresh": refresh }))
                .map_err(Error::from);
            let outcome = match request {
                Ok(request) => self.client.send_raw(&request).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                tracing::warn!(error = %e, "Logout call failed; clearing session anyway");
            }
        }
        self.client.tokens().clear();
        tracing::info!("Logged out");
    }

    /// Ask the server whether the held access token is valid. Never fails.
    pub async fn verify_token(&self) -> bool {
        let Some(token) = self.client.tokens().access() else {
            return false;
        };
        let request = match ApiRequest::post("token/verify/").json(&json!({ "token": token })) {
            Ok(request) => request,
            Err(_) => return false,
        };
        match self
            .client
            .send_anonymous::<serde_json::Value>(&request)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Token verification failed");
                false
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Fails with [`AuthErrorKind::SessionExpired`] when no session is held
    /// or the server rejects the refresh token; the session is cleared in
    /// the latter case.
    pub async fn refresh_token(&self) -> AuthResult<RefreshResponse> {
        match self.client.interceptor().refresh().await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(AuthError::new(AuthErrorKind::SessionExpired, SESSION_EXPIRED)),
            Err(e @ Error::Network(_)) => Err(session(e)),
            Err(e) => {
                let mut err = AuthError::new(AuthErrorKind::SessionExpired, SESSION_EXPIRED);
                if let Error::Api { status, payload } = e {
                    err = err.with_response(status, payload);
                }
                Err(err)
            }
        }
    }

    /// Fetch the authenticated account.
    pub async fn current_user(&self) -> AuthResult<User> {
        self.client
            .send(&ApiRequest::get("user/me/"))
            .await
            .map_err(session)
    }
}

fn credentials(error: Error) -> AuthError {
    normalize(error, ErrorContext::Credentials)
}

fn session(error: Error) -> AuthError {
    normalize(error, ErrorContext::Session)
}

fn role_mismatch(actual: Role) -> AuthError {
    let label = actual.label();
    AuthError::new(
        AuthErrorKind::RoleMismatch,
        format!(
            "This account is registered as a {label}. Please go back to role selection and choose \"{label}\" to access the correct login page."
        ),
    )
}
