//! Session-aware HTTP client SDK for the Lung Vision API.
//!
//! This crate owns the authentication lifecycle of a Lung Vision front end:
//! the access/refresh token pair, bearer injection, silent refresh on 401,
//! normalized user-facing errors, and a stale-aware session cache.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lungvision_client::{
//!     FileTokenStorage, LungVisionClient, SessionContext, StorageKeys, UploadFile,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(FileTokenStorage::new("tokens.json", StorageKeys::default()));
//! let client = LungVisionClient::builder()
//!     .base_url("http://localhost:8000/api")
//!     .token_storage(storage)
//!     .build()?;
//!
//! let session = SessionContext::new(client);
//! let user = session.login("user@example.com", "Abc12345!").await?;
//! println!("Welcome, {}", user.full_name);
//!
//! // A 401 here is recovered transparently with the refresh token.
//! let archive = UploadFile::from_path("patient-001.zip".as_ref())?;
//! let prediction = session.client().predict().upload(archive).await?;
//! println!("{} ({:.1}%)", prediction.predicted_class, prediction.confidence * 100.0);
//!
//! session.logout().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Layers
//!
//! - **Token store**: [`TokenStore`] over a [`TokenStorage`] backend
//! - **Transport**: [`Transport`] executes [`ApiRequest`] envelopes
//! - **Refresh interceptor**: [`RefreshInterceptor`] replays once after a
//!   single, shared refresh
//! - **Auth service**: [`AuthApi`], [`PredictApi`]
//! - **Session cache**: [`SessionContext`]

pub mod api;
pub mod client;
pub mod error;
pub mod interceptor;
mod normalize;
pub mod retry;
pub mod session;
pub mod token_store;
pub mod transport;
pub mod types;
pub mod validation;

pub use api::{AuthApi, PredictApi};
pub use client::{ClientBuilder, DEFAULT_BASE_URL, DEFAULT_UPLOAD_TIMEOUT, LungVisionClient};
pub use error::{AuthError, AuthErrorKind, AuthResult, Error, Result};
pub use interceptor::{RefreshInterceptor, RefreshState};
pub use retry::{RetryClass, RetryPolicy};
pub use session::{SessionConfig, SessionContext};
pub use token_store::{
    FileTokenStorage, MemoryTokenStorage, PersistedTokens, SharedTokenStore, StorageKeys,
    TokenStorage, TokenStore,
};
pub use transport::{ApiRequest, MultipartForm, RequestBody, Transport};
pub use types::*;
