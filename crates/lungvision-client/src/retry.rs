//! Retry policies for session reads and writes.

use std::future::Future;
use std::time::Duration;

use crate::error::{AuthError, AuthErrorKind, AuthResult};

/// What kind of operation a policy guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Reads (current user). Auth, not-found and validation failures are
    /// final.
    Query,
    /// Writes (login, register, logout). Every 4xx is final.
    Mutation,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub class: RetryClass,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Up to 2 retries, `min(1s * 2^n, 30s)`.
    pub fn query() -> Self {
        Self {
            class: RetryClass::Query,
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    /// At most 1 retry, `min(1s * 2^n, 10s)`.
    pub fn mutation() -> Self {
        Self {
            class: RetryClass::Mutation,
            max_retries: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::mutation()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Whether a failure is worth another attempt under this policy.
    pub fn is_retryable(&self, error: &AuthError) -> bool {
        if matches!(
            error.kind,
            AuthErrorKind::InvalidInput | AuthErrorKind::RoleMismatch | AuthErrorKind::SessionExpired
        ) {
            return false;
        }
        match (self.class, error.status) {
            (RetryClass::Query, Some(400 | 401 | 403 | 404)) => false,
            (RetryClass::Mutation, Some(status)) if (400..500).contains(&status) => false,
            _ => true,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Run `f` until it succeeds, fails with a final error, or the policy's
/// retries are spent.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, operation: &str, mut f: F) -> AuthResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AuthResult<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < policy.max_retries && policy.is_retryable(&e) => {
                let backoff = policy.delay(attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
