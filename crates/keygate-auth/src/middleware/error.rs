//! Error response mapping for the authentication filter.
//!
//! Implements `IntoResponse` for [`AuthError`]: a JSON body with a stable
//! machine-readable `kind` (and `reason` for invalid tokens), the HTTP
//! status that matches the error class, and a `WWW-Authenticate` challenge
//! on 401 responses.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Some(reason) = self.token_reason() {
            error["reason"] = json!(reason.as_str());
        }
        let body = json!({ "error": error });

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(&self);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

/// HTTP status for an error.
fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::MissingCredentials | AuthError::InvalidToken { .. } => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::ClaimMismatch { .. } => StatusCode::FORBIDDEN,
        AuthError::KeyRetrieval { .. } => StatusCode::BAD_GATEWAY,
        AuthError::UserResolution { .. } | AuthError::Configuration { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Builds the `WWW-Authenticate` header value for 401 responses.
///
/// Format: `Bearer realm="keygate"` for missing credentials, with
/// `error`/`error_description` attributes appended for invalid tokens
/// (RFC 6750 §3).
fn build_www_authenticate_header(error: &AuthError) -> String {
    match error {
        AuthError::InvalidToken { reason } => {
            let description = reason.to_string().replace('"', "\\\"");
            format!(
                "Bearer realm=\"keygate\", error=\"invalid_token\", error_description=\"{description}\""
            )
        }
        _ => "Bearer realm=\"keygate\"".to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::error::InvalidTokenReason;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credentials_response() {
        let response = AuthError::MissingCredentials.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(www_auth, "Bearer realm=\"keygate\"");

        let json = body_json(response).await;
        assert_eq!(json["error"]["kind"], "missing_credentials");
        assert!(json["error"]["reason"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_token_response_carries_reason() {
        let response = AuthError::invalid_token(InvalidTokenReason::Expired).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(www_auth.contains("error=\"invalid_token\""));
        assert!(www_auth.contains("expired"));

        let json = body_json(response).await;
        assert_eq!(json["error"]["kind"], "invalid_token");
        assert_eq!(json["error"]["reason"], "expired");
    }

    #[tokio::test]
    async fn test_claim_mismatch_response() {
        let response =
            AuthError::claim_mismatch("email", "hint disagrees with token").into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        // No challenge on 403.
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));

        let json = body_json(response).await;
        assert_eq!(json["error"]["kind"], "claim_mismatch");
    }

    #[tokio::test]
    async fn test_key_retrieval_response() {
        let response = AuthError::key_retrieval("issuer unreachable").into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["kind"], "key_retrieval_error");
    }

    #[tokio::test]
    async fn test_server_error_responses() {
        let response = AuthError::user_resolution("pool exhausted").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AuthError::configuration("bad jwks url").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_www_authenticate_escaping() {
        let err = AuthError::malformed_token("contains \"quotes\"");
        let header = build_www_authenticate_header(&err);
        assert!(header.contains("\\\"quotes\\\""));
    }
}
