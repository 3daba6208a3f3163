use std::env;

use jsonwebtoken::{
    decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::models::user::User;
use crate::routes::auth::claims::Claims;

/// HS256 needs at least as many secret bytes as the hash output.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum JwtSecretError {
    #[error("JWT_SECRET must be set")]
    Missing,
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LENGTH} bytes, got {0}")]
    TooShort(usize),
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_env() -> Result<Self, JwtSecretError> {
        let value = env::var("JWT_SECRET").map_err(|_| JwtSecretError::Missing)?;
        Self::from_secret(value.trim())
    }

    pub fn from_secret(secret: impl AsRef<[u8]>) -> Result<Self, JwtSecretError> {
        let bytes = secret.as_ref();
        if bytes.len() < MIN_JWT_SECRET_LENGTH {
            return Err(JwtSecretError::TooShort(bytes.len()));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }
}

/// Signs and checks access tokens for the configured issuer and audience.
/// `AppState` implements it; the session extractor only needs this.
pub trait JwtKeyProvider {
    fn jwt_keys(&self) -> &JwtKeys;
    fn jwt_issuer(&self) -> &str;
    fn jwt_audience(&self) -> &str;

    fn issue_access_token(&self, user: &User, ttl: Duration) -> Result<String, Error> {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            exp: expires_at.unix_timestamp().max(0) as usize,
            iss: self.jwt_issuer().to_owned(),
            aud: self.jwt_audience().to_owned(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.jwt_keys().encoding,
        )
    }

    /// Rejects bad signatures, foreign issuers or audiences, and any token past `exp`.
    fn verify_access_token(&self, token: &str) -> Result<Claims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.jwt_issuer()]);
        validation.set_audience(&[self.jwt_audience()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = 0;
        Ok(decode::<Claims>(token, &self.jwt_keys().decoding, &validation)?.claims)
    }
}
