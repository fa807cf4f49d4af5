//! JSON Web Tokens for authenticating API requests, and the extractor that
//! validates them.

// Adapted from https://github.com/tokio-rs/axum/blob/main/examples/jwt/src/main.rs

use axum::{
    RequestPartsExt,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{AppState, Error, user::UserID};

/// The contents of a JSON Web Token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The ID of the user the token was issued to.
    pub sub: UserID,
    /// The email of the user at the time the token was issued.
    pub email: String,
    /// The time the token was issued, in seconds since the Unix epoch.
    pub iat: i64,
    /// The expiry time of the token, in seconds since the Unix epoch.
    pub exp: i64,
}

/// The state needed to validate bearer tokens.
#[derive(Clone)]
pub struct AuthState {
    /// Verifies the token signature.
    pub decoding_key: DecodingKey,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            decoding_key: state.jwt_keys.decoding_key.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for Claims
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|rejection| {
                if rejection.is_missing() {
                    Error::MissingToken
                } else {
                    Error::InvalidToken
                }
            })?;

        let auth_state = AuthState::from_ref(state);

        decode_jwt(bearer.token(), &auth_state.decoding_key)
    }
}

/// Create a signed token for `user_id` that expires `duration` after `now`.
///
/// # Errors
///
/// Returns [Error::TokenCreation] if the token could not be signed.
pub fn encode_jwt(
    user_id: UserID,
    email: &str,
    now: OffsetDateTime,
    duration: Duration,
    encoding_key: &EncodingKey,
) -> Result<String, Error> {
    let claims = Claims {
        sub: user_id,
        email: email.to_owned(),
        iat: now.unix_timestamp(),
        exp: (now + duration).unix_timestamp(),
    };

    encode(&Header::default(), &claims, encoding_key)
        .map_err(|error| Error::TokenCreation(error.to_string()))
}

/// Verify the signature and expiry of `token` and return its claims.
///
/// # Errors
///
/// Returns [Error::InvalidToken] if the token is malformed, was signed with a
/// different key, or has expired.
pub fn decode_jwt(token: &str, decoding_key: &DecodingKey) -> Result<Claims, Error> {
    decode::<Claims>(token, decoding_key, &Validation::default())
        .map(|token_data| token_data.claims)
        .map_err(|error| {
            tracing::debug!("Rejected bearer token: {error}");
            Error::InvalidToken
        })
}
