//! Shared-token authentication middleware
//!
//! When a token is configured, every route except `/healthz` requires it via
//! `Authorization: Bearer`, `X-MCP-Token`, or a `token` query parameter.
//! Without a token, all requests are allowed.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::http::AppState;

const TOKEN_HEADER: &str = "x-mcp-token";

/// Token presented by the client, in precedence order
fn presented_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    if bearer.is_some() {
        return bearer;
    }

    let header_token = headers
        .get(TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|t| t.trim().to_string());
    if header_token.is_some() {
        return header_token;
    }

    query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    })
}

/// Constant-time token comparison
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Unauthorized" })),
    )
        .into_response()
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.server.token.as_deref() else {
        return next.run(request).await;
    };

    match presented_token(request.headers(), request.uri().query()) {
        Some(token) if token_matches(&token, expected) => next.run(request).await,
        Some(_) => {
            tracing::warn!("Invalid token provided for {}", request.uri().path());
            unauthorized()
        }
        None => {
            tracing::warn!("Missing token for {}", request.uri().path());
            unauthorized()
        }
    }
}
