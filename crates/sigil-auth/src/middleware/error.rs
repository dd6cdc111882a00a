//! Error responses for authentication failures.
//!
//! Client errors render as `401` with a JSON body of the form
//! `{"detail": ..., "code": ...}`. Token validation failures add a
//! `messages` list with one entry per attempted token class. Server errors
//! render as `500` without internal detail.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

use super::resolver::challenge;

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        error_response(&self, &challenge("Bearer"))
    }
}

/// Renders `error`, advertising `www_authenticate` on `401` responses.
pub fn error_response(error: &AuthError, www_authenticate: &str) -> Response {
    let status = status_code(error);

    let body = if error.is_client_error() {
        let mut body = json!({
            "detail": error.to_string(),
            "code": error.code(),
        });
        if let AuthError::InvalidToken { messages, .. } = error {
            if !messages.is_empty() {
                body["messages"] = json!(messages);
            }
        }
        body
    } else {
        tracing::error!(error = %error, category = %error.category(), "Authentication failed with a server error");
        json!({
            "detail": "A server error occurred.",
            "code": error.code(),
        })
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if status == StatusCode::UNAUTHORIZED {
        if let Ok(value) = HeaderValue::from_str(www_authenticate) {
            headers.insert(header::WWW_AUTHENTICATE, value);
        }
    }

    (status, headers, Json(body)).into_response()
}

/// Maps an error to its HTTP status.
#[must_use]
pub fn status_code(error: &AuthError) -> StatusCode {
    if error.is_client_error() {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenFailure;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_authentication_failed_response() {
        let response = AuthError::user_inactive().into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"api\""
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(body["detail"], "User is inactive");
        assert_eq!(body["code"], "user_inactive");
        assert!(body.get("messages").is_none());
    }

    #[tokio::test]
    async fn test_invalid_token_response_lists_messages() {
        let error = AuthError::invalid_token_with_messages(
            "Given token not valid for any token type",
            vec![TokenFailure {
                token_class: "AccessToken".to_string(),
                token_type: "access".to_string(),
                message: "Token is invalid or expired".to_string(),
            }],
        );
        let body = body_json(error.into_response()).await;

        assert_eq!(body["code"], "token_not_valid");
        assert_eq!(body["messages"][0]["token_class"], "AccessToken");
        assert_eq!(body["messages"][0]["token_type"], "access");
        assert_eq!(body["messages"][0]["message"], "Token is invalid or expired");
    }

    #[tokio::test]
    async fn test_server_error_hides_detail() {
        let response = AuthError::storage("password=hunter2 connection refused").into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

        let body = body_json(response).await;
        assert_eq!(body["code"], "server_error");
        assert!(!body["detail"].as_str().unwrap().contains("hunter2"));
    }

    #[test]
    fn test_custom_challenge() {
        let response = error_response(&AuthError::not_authenticated(), "JWT realm=\"api\"");
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "JWT realm=\"api\""
        );
    }
}
