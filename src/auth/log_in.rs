//! Exchanges an email and password for an access token.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
};
use jsonwebtoken::EncodingKey;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, Error,
    auth::encode_jwt,
    user::{User, UserResponse, get_user_by_email},
};

/// The state needed to log in a user.
#[derive(Clone)]
pub struct LoginState {
    /// Signs the access tokens.
    pub encoding_key: EncodingKey,
    /// The duration for which access tokens are valid.
    pub token_duration: Duration,
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            encoding_key: state.jwt_keys.encoding_key.clone(),
            token_duration: state.token_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The credentials entered during log-in.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogInData {
    /// Email entered during log-in.
    pub email: String,
    /// Password entered during log-in.
    pub password: String,
}

/// The response to a successful log-in or registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The bearer token for subsequent requests.
    pub access_token: String,
    /// The authenticated user.
    pub user: UserResponse,
}

impl AuthResponse {
    /// Issue a token for `user`.
    ///
    /// # Errors
    ///
    /// Returns [Error::TokenCreation] if the token could not be signed.
    pub fn new(
        user: &User,
        encoding_key: &EncodingKey,
        token_duration: Duration,
    ) -> Result<Self, Error> {
        let access_token = encode_jwt(
            user.id,
            &user.email,
            OffsetDateTime::now_utc(),
            token_duration,
            encoding_key,
        )?;

        Ok(Self {
            access_token,
            user: UserResponse::from(user),
        })
    }
}

/// Handler for log-in requests.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - The email does not belong to a registered user.
/// - The password is not correct.
/// - An internal error occurred when verifying the password.
///
/// The first two cases both produce [Error::InvalidCredentials].
pub async fn post_log_in(
    State(state): State<LoginState>,
    Json(user_data): Json<LogInData>,
) -> Result<Json<AuthResponse>, Error> {
    let user = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_user_by_email(&user_data.email, &connection).map_err(|error| match error {
            Error::NotFound => Error::InvalidCredentials,
            error => error,
        })?
    };

    let password_is_correct = user
        .password_hash
        .verify(&user_data.password)
        .map_err(|error| Error::HashingError(error.to_string()))?;

    if !password_is_correct {
        tracing::debug!("Wrong password for user {}", user.id);
        return Err(Error::InvalidCredentials);
    }

    tracing::info!("User {} logged in", user.id);

    AuthResponse::new(&user, &state.encoding_key, state.token_duration).map(Json)
}
