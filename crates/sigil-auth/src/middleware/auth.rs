//! Axum extractors for JWT authentication.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use sigil_auth::middleware::JwtAuth;
//!
//! async fn whoami(JwtAuth(auth): JwtAuth) -> String {
//!     auth.user.username
//! }
//!
//! let app = Router::new()
//!     .route("/whoami", get(whoami))
//!     .with_state(app_state);
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Response},
};

use crate::error::AuthError;

use super::error::error_response;
use super::resolver::{Authenticated, JwtAuthenticator};

/// Rejection produced by the extractors.
///
/// Carries the challenge of the authenticator that rejected the request so
/// the `WWW-Authenticate` header names the configured scheme.
#[derive(Debug)]
pub struct AuthRejection {
    pub error: AuthError,
    pub www_authenticate: String,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        error_response(&self.error, &self.www_authenticate)
    }
}

/// Requires an authenticated user.
///
/// Rejects with `not_authenticated` when the request carries no recognized
/// credential.
#[derive(Debug, Clone)]
pub struct JwtAuth(pub Authenticated);

impl<S> FromRequestParts<S> for JwtAuth
where
    S: Send + Sync,
    JwtAuthenticator: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = JwtAuthenticator::from_ref(state);
        let reject = |error| AuthRejection {
            error,
            www_authenticate: authenticator.www_authenticate(),
        };

        match authenticator.authenticate(&parts.headers).await {
            Ok(Some(authenticated)) => Ok(Self(authenticated)),
            Ok(None) => Err(reject(AuthError::not_authenticated())),
            Err(e) => Err(reject(e)),
        }
    }
}

/// Authenticates the user when a credential is present.
///
/// A request without a recognized credential yields `None`; a present but
/// invalid credential is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalJwtAuth(pub Option<Authenticated>);

impl<S> FromRequestParts<S> for OptionalJwtAuth
where
    S: Send + Sync,
    JwtAuthenticator: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = JwtAuthenticator::from_ref(state);
        authenticator
            .authenticate(&parts.headers)
            .await
            .map(Self)
            .map_err(|error| AuthRejection {
                error,
                www_authenticate: authenticator.www_authenticate(),
            })
    }
}
