//! Rewriting transport failures into user-facing messages.
//!
//! The backend speaks Django REST Framework error shapes: field maps
//! (`{"email": ["..."]}`), a `detail` string, or `non_field_errors`.

use serde_json::Value;

use crate::error::{AuthError, AuthErrorKind, Error};

pub(crate) const INVALID_CREDENTIALS: &str =
    "Invalid email or password. Please check your credentials and try again.";
pub(crate) const DUPLICATE_ACCOUNT: &str =
    "An account with this email already exists. Please try logging in instead.";
pub(crate) const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";
const FORBIDDEN: &str = "You do not have permission to perform this action.";
const NOT_FOUND: &str = "The requested resource was not found.";
const SERVER_ERROR: &str =
    "Server error. Please try again later or contact support if the problem persists.";
const NETWORK_ERROR: &str =
    "Unable to connect to the server. Please check your internet connection and try again.";
const UNEXPECTED: &str = "An unexpected error occurred. Please try again.";

/// Fields whose messages are surfaced directly, in display order.
const DISPLAYED_FIELDS: [&str; 3] = ["email", "password", "full_name"];

/// Which side of the session a failed call was on.
///
/// A 401 while presenting credentials means the credentials were wrong; a
/// 401 on an authenticated call means the session is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorContext {
    Credentials,
    Session,
}

pub(crate) fn normalize(error: Error, context: ErrorContext) -> AuthError {
    match error {
        Error::Api { status, payload } => from_response(status, payload, context),
        Error::Network(detail) => {
            tracing::debug!(%detail, "No response from server");
            AuthError::new(AuthErrorKind::Network, NETWORK_ERROR)
        }
        other => {
            tracing::debug!(error = %other, "Unexpected client failure");
            AuthError::new(AuthErrorKind::Unexpected, UNEXPECTED)
        }
    }
}

fn from_response(status: u16, payload: Value, context: ErrorContext) -> AuthError {
    let (kind, message) = field_message(status, &payload, context)
        .or_else(|| {
            payload
                .get("detail")
                .and_then(Value::as_str)
                .map(|detail| classify_detail(status, detail, context))
        })
        .or_else(|| {
            first_message(payload.get("non_field_errors")?)
                .map(|m| (kind_for_status(status, context), m))
        })
        .unwrap_or_else(|| {
            (
                kind_for_status(status, context),
                fallback_message(status, context),
            )
        });

    AuthError::new(kind, message).with_response(status, payload)
}

fn field_message(
    status: u16,
    payload: &Value,
    context: ErrorContext,
) -> Option<(AuthErrorKind, String)> {
    let messages: Vec<String> = DISPLAYED_FIELDS
        .iter()
        .filter_map(|field| payload.get(*field).and_then(first_message))
        .collect();
    if messages.is_empty() {
        return None;
    }

    let duplicate = payload
        .get("email")
        .and_then(first_message)
        .is_some_and(|m| is_duplicate(&m));
    if duplicate {
        return Some((AuthErrorKind::DuplicateAccount, DUPLICATE_ACCOUNT.to_string()));
    }

    Some((kind_for_status(status, context), messages.join(", ")))
}

fn classify_detail(status: u16, detail: &str, context: ErrorContext) -> (AuthErrorKind, String) {
    let lower = detail.to_lowercase();

    if status == 401
        || lower.contains("invalid credentials")
        || lower.contains("no active account")
    {
        return match (context, status) {
            (ErrorContext::Session, 401) => {
                (AuthErrorKind::SessionExpired, SESSION_EXPIRED.to_string())
            }
            _ => (
                AuthErrorKind::InvalidCredentials,
                INVALID_CREDENTIALS.to_string(),
            ),
        };
    }
    if lower.contains("user already exists") || lower.contains("already registered") {
        return (AuthErrorKind::DuplicateAccount, DUPLICATE_ACCOUNT.to_string());
    }

    match status {
        403 => (AuthErrorKind::Forbidden, FORBIDDEN.to_string()),
        404 => (AuthErrorKind::NotFound, NOT_FOUND.to_string()),
        s if s >= 500 => (AuthErrorKind::Server, SERVER_ERROR.to_string()),
        _ => (kind_for_status(status, context), detail.to_string()),
    }
}

fn kind_for_status(status: u16, context: ErrorContext) -> AuthErrorKind {
    match status {
        400 | 422 => AuthErrorKind::Validation,
        401 => match context {
            ErrorContext::Credentials => AuthErrorKind::InvalidCredentials,
            ErrorContext::Session => AuthErrorKind::SessionExpired,
        },
        403 => AuthErrorKind::Forbidden,
        404 => AuthErrorKind::NotFound,
        429 => AuthErrorKind::RateLimited,
        500..=599 => AuthErrorKind::Server,
        _ => AuthErrorKind::Unexpected,
    }
}

fn fallback_message(status: u16, context: ErrorContext) -> String {
    let message = match status {
        400 => "Invalid request. Please check your input and try again.",
        401 => match context {
            ErrorContext::Credentials => INVALID_CREDENTIALS,
            ErrorContext::Session => SESSION_EXPIRED,
        },
        403 => FORBIDDEN,
        404 => NOT_FOUND,
        422 => "Invalid data provided. Please check your input.",
        429 => "Too many requests. Please wait a moment and try again.",
        500 => "Server error. Please try again later.",
        other => return format!("An error occurred. Please try again later. (Error {other})"),
    };
    message.to_string()
}

fn first_message(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(first_message),
        other => Some(other.to_string()),
    }
}

fn is_duplicate(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already exists") || lower.contains("already registered")
}
