use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::routes::auth::claims::Claims;
use crate::utils::jwt::JwtKeyProvider;

pub const AUTH_COOKIE: &str = "auth_token";

/// Authenticated caller, taken from `Authorization: Bearer` or the `auth_token` cookie.
#[derive(Debug, PartialEq)]
pub struct AuthSession(pub Claims);

impl AuthSession {
    pub fn user_id(&self) -> Uuid {
        self.0.sub
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: JwtKeyProvider + Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts) {
            Some(token) => token,
            None => {
                let jar = CookieJar::from_headers(&parts.headers);
                jar.get(AUTH_COOKIE)
                    .map(|c| c.value().to_string())
                    .ok_or(StatusCode::UNAUTHORIZED)?
            }
        };

        let claims = state
            .verify_access_token(&token)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(AuthSession(claims))
    }
}
