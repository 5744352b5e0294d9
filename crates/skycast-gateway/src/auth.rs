//! Bearer-token authentication.
//!
//! Tokens are handed out once at registration. Only their SHA-256 hash is
//! stored; requests are matched by hashing the presented token.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use skycast_core::traits::UserStore;
use std::sync::Arc;

use super::server::AppState;

/// Hex SHA-256 of a token.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Fresh random API token.
pub fn generate_token() -> String {
    format!(
        "sk_{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"ok": false, "error": message})),
    )
        .into_response()
}

/// Resolve the caller from `Authorization: Bearer <token>` and attach the
/// [`User`](skycast_core::types::User) as a request extension.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        return unauthorized("Unauthorized: missing bearer token");
    };

    match state.db.find_user_by_token(&hash_token(token)) {
        Ok(Some(user)) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Ok(None) => unauthorized("Unauthorized: invalid token"),
        Err(e) => {
            tracing::error!("Token lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"ok": false, "error": "internal error"})),
            )
                .into_response()
        }
    }
}
