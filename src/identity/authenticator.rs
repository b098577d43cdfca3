use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use super::token::TokenCodec;
use crate::error::AuthError;

/// Resolves the caller's email from the `Authorization` header of a single call.
/// Stateless: every call is verified from scratch.
#[derive(Clone, Debug)]
pub struct RequestAuthenticator {
    codec: TokenCodec,
}

impl RequestAuthenticator {
    pub fn new(codec: TokenCodec) -> Self { Self { codec } }

    pub fn codec(&self) -> &TokenCodec { &self.codec }

    /// `"<scheme> <token>"`. The scheme word is not checked.
    pub fn authenticate_header(&self, raw: Option<&str>) -> Result<String, AuthError> {
        let token = extract_token(raw)?;
        self.codec.verify(token)
    }

    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let raw = match headers.get(AUTHORIZATION) {
            None => None,
            Some(v) => Some(v.to_str().map_err(|_| AuthError::MalformedHeader)?),
        };
        self.authenticate_header(raw)
    }
}

/// Second of exactly two parts separated by a single space. Tabs and runs of spaces are
/// malformed.
pub fn extract_token(raw: Option<&str>) -> Result<&str, AuthError> {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r,
        _ => return Err(AuthError::MissingCredentials),
    };
    let mut parts = raw.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if !scheme.is_empty() && !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
