//! Device credential extraction
//!
//! Devices authenticate with a per-device API key, sent either as an
//! `X-API-Key` header or as a bearer token. Key lookup itself lives in the
//! core service; this module only pulls the credential off the request.

use axum::http::HeaderMap;

use crate::error::AppError;

/// Extract the device API key from request headers.
pub fn extract_api_key(headers: &HeaderMap) -> Result<&str, AppError> {
    if let Some(value) = headers.get("x-api-key") {
        let key = value
            .to_str()
            .map_err(|_| AppError::unauthorized("API key contains invalid characters"))?
            .trim();
        if key.is_empty() {
            return Err(AppError::unauthorized("API key is required"));
        }
        return Ok(key);
    }

    let authorization = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("API key is required"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header contains invalid characters"))?;

    let key = authorization
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("Authorization header must be a bearer token"))?
        .trim();
    if key.is_empty() {
        return Err(AppError::unauthorized("API key is required"));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn api_key_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("key-123"));
        headers.insert("authorization", HeaderValue::from_static("Bearer other"));
        assert_eq!(extract_api_key(&headers).unwrap(), "key-123");
    }

    #[test]
    fn bearer_token_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer key-123"));
        assert_eq!(extract_api_key(&headers).unwrap(), "key-123");
    }

    #[test]
    fn missing_credential_is_rejected() {
        let headers = HeaderMap::new();
        assert!(extract_api_key(&headers).is_err());
    }

    #[test]
    fn non_bearer_authorization_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert!(extract_api_key(&headers).is_err());
    }

    #[test]
    fn blank_key_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("   "));
        assert!(extract_api_key(&headers).is_err());
    }
}
