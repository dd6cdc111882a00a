//! HTTP authentication for axum applications.
//!
//! - [`JwtAuthenticator`]: header extraction, token validation, user lookup
//! - [`JwtAuth`] / [`OptionalJwtAuth`]: extractors built on it
//! - `IntoResponse` for [`AuthError`](crate::AuthError): `401`/`500` JSON bodies
//!
//! # Example
//!
//! ```ignore
//! use axum::extract::FromRef;
//! use sigil_auth::middleware::JwtAuthenticator;
//!
//! #[derive(Clone)]
//! struct AppState {
//!     auth: JwtAuthenticator,
//! }
//!
//! impl FromRef<AppState> for JwtAuthenticator {
//!     fn from_ref(state: &AppState) -> Self {
//!         state.auth.clone()
//!     }
//! }
//! ```

pub mod auth;
pub mod error;
pub mod resolver;

pub use auth::{AuthRejection, JwtAuth, OptionalJwtAuth};
pub use error::{error_response, status_code};
pub use resolver::{Authenticated, JwtAuthenticator, REALM, ValidatedToken, challenge};
