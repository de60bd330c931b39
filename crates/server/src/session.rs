//! Per-request caller identity.
//!
//! The authenticating gateway in front of the service forwards who the caller
//! is in `X-User-Id`, `X-User-Name` and `X-User-Role`. A [`CallerSession`] is
//! built from those headers for every handler invocation and dropped with the
//! response.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use eapproval_core::session::{Role, Session};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone, Debug)]
pub struct CallerSession {
    pub session: Session,
    pub correlation_id: String,
}

impl<S> FromRequestParts<S> for CallerSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(&parts.headers);
        let session = session_from_headers(&parts.headers, &correlation_id)?;
        Ok(Self { session, correlation_id })
    }
}

pub fn correlation_id(headers: &HeaderMap) -> String {
    header_value(headers, CORRELATION_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn session_from_headers(headers: &HeaderMap, correlation_id: &str) -> Result<Session, ApiError> {
    let user_id = header_value(headers, USER_ID_HEADER)
        .ok_or_else(|| ApiError::unauthorized("missing X-User-Id header", correlation_id))?;
    let role = header_value(headers, USER_ROLE_HEADER)
        .ok_or_else(|| ApiError::unauthorized("missing X-User-Role header", correlation_id))?
        .parse::<Role>()
        .map_err(|error| ApiError::bad_request(error.to_string(), correlation_id))?;
    let display_name = header_value(headers, USER_NAME_HEADER).unwrap_or(user_id);

    Ok(Session::new(user_id, display_name, role))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Shared bearer token guarding `/api`. `None` leaves the routes open.
#[derive(Clone, Default)]
pub struct ApiToken(Option<Arc<SecretString>>);

impl ApiToken {
    pub fn new(token: Option<SecretString>) -> Self {
        Self(token.map(Arc::new))
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        let Some(expected) = &self.0 else {
            return true;
        };
        let Some(presented) = presented else {
            return false;
        };

        expected.expose_secret().as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

pub async fn require_api_token(
    State(token): State<ApiToken>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    if !token.accepts(presented) {
        let correlation_id = correlation_id(request.headers());
        return Err(ApiError::unauthorized("missing or invalid bearer token", &correlation_id));
    }

    Ok(next.run(request).await)
}
