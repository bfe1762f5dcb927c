use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use eternity_core::{DirectorySource, NotificationSink};

use crate::error::ApiError;
use crate::AppState;

/// Caller holding the relay's shared bearer token.
pub struct Relay;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?
        .strip_prefix("Bearer ")
}

impl<S, N> FromRequestParts<AppState<S, N>> for Relay
where
    S: DirectorySource,
    N: NotificationSink,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S, N>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            Some(token) if token == &*state.api_token => Ok(Relay),
            _ => Err(ApiError::Unauthorized),
        }
    }
}
