//! Request extractors. Rejections are turned into [`ApiError`] so every
//! failure leaves in the same envelope.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use kinship_shared::Caller;
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::AppState;
use crate::config::ServerConfig;
use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const GATEWAY_TOKEN_HEADER: &str = "x-gateway-token";

/// The caller identity asserted by the upstream auth gateway.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Caller);

fn verify_gateway_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ApiError> {
    let Some(ref expected) = config.gateway_token else {
        return Ok(());
    };

    let token = headers
        .get(GATEWAY_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ApiError::Unauthorized("Invalid gateway token".into()));
    }
    Ok(())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        verify_gateway_token(&parts.headers, &state.config)?;

        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))?;
        let user_id = Uuid::parse_str(raw.trim())
            .map_err(|_| ApiError::Unauthorized("Invalid user id".into()))?;

        Ok(CurrentUser(Caller::new(user_id)))
    }
}

/// `axum::Json` with a 400 envelope on malformed bodies.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(v)| ApiJson(v))
            .map_err(|e| ApiError::BadRequest(e.body_text()))
    }
}

/// `axum::extract::Path` with a 400 envelope on unparsable segments.
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(v)| ApiPath(v))
            .map_err(|e| ApiError::BadRequest(e.body_text()))
    }
}

/// `axum::extract::Query` with a 400 envelope on bad parameters.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(v)| ApiQuery(v))
            .map_err(|e| ApiError::BadRequest(e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn gateway_token_is_optional_until_configured() {
        let mut config = ServerConfig::default();
        let mut headers = HeaderMap::new();
        assert!(verify_gateway_token(&headers, &config).is_ok());

        config.gateway_token = Some("s3cret".into());
        assert!(matches!(
            verify_gateway_token(&headers, &config),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert(GATEWAY_TOKEN_HEADER, HeaderValue::from_static("s3creT"));
        assert!(verify_gateway_token(&headers, &config).is_err());

        headers.insert(GATEWAY_TOKEN_HEADER, HeaderValue::from_static("s3cret"));
        assert!(verify_gateway_token(&headers, &config).is_ok());
    }
}
