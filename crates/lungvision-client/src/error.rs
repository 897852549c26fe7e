//! Client error types.
//!
//! Two layers: [`Error`] is what the transport raises (status plus raw
//! server payload), [`AuthError`] is the normalized, user-facing failure the
//! session service hands to callers.

use serde_json::Value;
use thiserror::Error;

/// Transport-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Server answered with a non-success status.
    #[error("API error ({status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, parsed as JSON when possible.
        payload: Value,
    },

    /// No response was received (connect failure, timeout, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisting or reading the credential pair failed.
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Anything else.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() || e.is_decode() {
            Error::Unexpected(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl Error {
    /// HTTP status carried by this error, if the server responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this is a 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Check if this is a 4xx response.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(s) if (400..500).contains(&s))
    }

    /// Check if this is a 5xx response.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(s) if s >= 500)
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Category of a user-facing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// 400/422 field or request validation failure reported by the server.
    Validation,
    /// Registration with an email that is already in use.
    DuplicateAccount,
    /// Login rejected (401).
    InvalidCredentials,
    /// Session can no longer be recovered; the user must log in again.
    SessionExpired,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 429.
    RateLimited,
    /// 5xx.
    Server,
    /// No response received.
    Network,
    /// Account role does not match the portal it logged in through.
    RoleMismatch,
    /// Input rejected locally before any request was sent.
    InvalidInput,
    /// Anything else.
    Unexpected,
}

/// Normalized failure carrying a message fit for display.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AuthError {
    /// Failure category.
    pub kind: AuthErrorKind,
    /// Human-readable message.
    pub message: String,
    /// HTTP status, when the server responded.
    pub status: Option<u16>,
    /// Raw server payload (or local field errors for `InvalidInput`).
    pub payload: Option<Value>,
}

impl AuthError {
    /// Create an error without status or payload.
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    pub(crate) fn with_response(mut self, status: u16, payload: Value) -> Self {
        self.status = Some(status);
        self.payload = Some(payload);
        self
    }

    /// Check if the server answered with a 4xx status.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(s) if (400..500).contains(&s))
    }

    /// Check if the server answered with a 5xx status.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(s) if s >= 500)
    }

    /// Field-level messages (`{"field": ["message", ...]}` payload shape).
    pub fn field_errors(&self) -> Vec<(String, String)> {
        let Some(Value::Object(map)) = &self.payload else {
            return Vec::new();
        };
        map.iter()
            .filter_map(|(field, value)| match value {
                Value::Array(items) => items
                    .first()
                    .and_then(Value::as_str)
                    .map(|m| (field.clone(), m.to_string())),
                Value::String(m) => Some((field.clone(), m.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Result type for session-level operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_predicates() {
        let err = Error::Api {
            status: 401,
            payload: Value::Null,
        };
        assert!(err.is_unauthorized());
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = Error::Api {
            status: 503,
            payload: Value::Null,
        };
        assert!(err.is_server_error());
        assert!(!err.is_unauthorized());

        assert_eq!(Error::Network("refused".into()).status(), None);
    }

    #[test]
    fn test_auth_error_displays_message() {
        let err = AuthError::new(AuthErrorKind::Network, "offline");
        assert_eq!(err.to_string(), "offline");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_field_errors_from_payload() {
        let err = AuthError::new(AuthErrorKind::Validation, "bad").with_response(
            400,
            json!({"email": ["already exists"], "password": "too short", "code": 3}),
        );
        let mut fields = err.field_errors();
        fields.sort();
        assert_eq!(
            fields,
            vec![
                ("email".to_string(), "already exists".to_string()),
                ("password".to_string(), "too short".to_string()),
            ]
        );
        assert!(err.is_client_error());
    }
}
