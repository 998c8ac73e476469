use axum::http::HeaderMap;

use crate::error::AppError;

/// Header carrying the tenant token
pub const TOKEN_HEADER: &str = "x-token";

/// Resolve the tenant token of a request
///
/// `X-Token` is what clients send; `Authorization: Bearer <token>` is
/// accepted when it is absent. The token is opaque and never validated.
pub fn extract_tenant_token(headers: &HeaderMap) -> Result<&str, AppError> {
    if let Some(value) = headers.get(TOKEN_HEADER) {
        let token = value
            .to_str()
            .map_err(|_| AppError::unauthorized("X-Token header is not valid UTF-8"))?
            .trim();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    if headers.contains_key("authorization") {
        return extract_bearer_token(headers);
    }

    Err(AppError::unauthorized("Token is required"))
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}
