//! Token endpoint handlers.
//!
//! # Usage
//!
//! ```ignore
//! use sigil_auth::http::token_routes;
//!
//! let app = token_routes().with_state(app_state);
//! ```
//!
//! | Method | Path | Request | Response |
//! |---|---|---|---|
//! | POST | `/api/token/` | `{username, password}` | `{access, refresh}` |
//! | POST | `/api/token/refresh/` | `{refresh}` | `{access[, refresh]}` |
//! | POST | `/api/token/blacklist/` | `{refresh}` | `{}` |
//! | POST | `/api/token/rotated/` | `{refresh}` | `{access, refresh}` |

use axum::{
    Json, Router,
    extract::{FromRef, State},
    routing::post,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AuthError;
use crate::middleware::{AuthRejection, challenge};
use crate::token::{RefreshedTokens, TokenPair, TokenService};

/// Credentials for obtaining a token pair.
#[derive(Debug, Deserialize)]
pub struct ObtainPairRequest {
    pub username: String,
    pub password: String,
}

/// A refresh token submitted for refresh, blacklisting or rotation.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Builds the token endpoint router.
pub fn token_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    TokenService: FromRef<S>,
{
    Router::new()
        .route("/api/token/", post(obtain_pair_handler))
        .route("/api/token/refresh/", post(refresh_handler))
        .route("/api/token/blacklist/", post(blacklist_handler))
        .route("/api/token/rotated/", post(rotated_handler))
}

/// Attaches the challenge for the currently configured header type.
fn reject(service: &TokenService, error: AuthError) -> AuthRejection {
    let ctx = service.context().load();
    AuthRejection {
        error,
        www_authenticate: challenge(ctx.settings().primary_header_type()),
    }
}

/// `POST /api/token/`
pub async fn obtain_pair_handler(
    State(service): State<TokenService>,
    Json(request): Json<ObtainPairRequest>,
) -> Result<Json<TokenPair>, AuthRejection> {
    service
        .obtain_pair(&request.username, &request.password)
        .await
        .map(Json)
        .map_err(|e| reject(&service, e))
}

/// `POST /api/token/refresh/`
pub async fn refresh_handler(
    State(service): State<TokenService>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshedTokens>, AuthRejection> {
    service
        .refresh(&request.refresh)
        .await
        .map(Json)
        .map_err(|e| reject(&service, e))
}

/// `POST /api/token/blacklist/`
pub async fn blacklist_handler(
    State(service): State<TokenService>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Value>, AuthRejection> {
    service
        .blacklist(&request.refresh)
        .await
        .map_err(|e| reject(&service, e))?;
    Ok(Json(json!({})))
}

/// `POST /api/token/rotated/`
pub async fn rotated_handler(
    State(service): State<TokenService>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthRejection> {
    service
        .rotate(&request.refresh)
        .await
        .map(Json)
        .map_err(|e| reject(&service, e))
}
