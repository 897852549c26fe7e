//! API endpoint implementations.

mod auth;
mod predict;

pub use auth::AuthApi;
pub use predict::PredictApi;
