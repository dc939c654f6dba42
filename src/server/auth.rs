//! Bearer-token gate for the admin routes.
//!
//! Tokens are the demo tokens issued by the login handler; there is no
//! signature or expiry check behind them.

use axum::{
    extract::Request,
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::ApiError;

pub const DEMO_TOKEN_PREFIX: &str = "demo-admin-token";

/// Caller identity attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminClaims {
    pub role: &'static str,
}

pub async fn require_admin(mut request: Request, next: Next) -> Response {
    // CORS preflight
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let token = match extract_bearer_token(request.headers()) {
        Some(token) => token,
        None => {
            return ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
                .into_response()
        }
    };

    if !token.starts_with(DEMO_TOKEN_PREFIX) {
        return ApiError::Unauthorized("Invalid token".to_string()).into_response();
    }

    request
        .extensions_mut()
        .insert(AdminClaims { role: "admin" });
    next.run(request).await
}

/// Demo token in the shape the auth middleware accepts.
pub fn issue_demo_token(address: &str, issued_at: u64) -> String {
    format!("{}-{}-{}", DEMO_TOKEN_PREFIX, address, issued_at)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
