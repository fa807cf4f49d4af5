//! Registers a new user and logs them in.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use jsonwebtoken::EncodingKey;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, Error,
    auth::AuthResponse,
    user::{UserData, create_user},
};

/// The state needed for creating a new user.
#[derive(Clone)]
pub struct RegistrationState {
    /// Signs the access token of the new user.
    pub encoding_key: EncodingKey,
    /// The duration for which access tokens are valid.
    pub token_duration: Duration,
    /// The database connection for storing the new user.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            encoding_key: state.jwt_keys.encoding_key.clone(),
            token_duration: state.token_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for registering a new user.
///
/// Responds with an access token for the new user so that clients do not
/// need to log in separately.
///
/// # Errors
///
/// Returns [Error::DuplicateUser] if the email or username is taken, or a
/// validation error if the data is invalid.
pub async fn register_user(
    State(state): State<RegistrationState>,
    Json(user_data): Json<UserData>,
) -> Result<(StatusCode, Json<AuthResponse>), Error> {
    let new_user = user_data.into_new_user()?;

    let user = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        create_user(new_user, OffsetDateTime::now_utc(), &connection)?
    };

    tracing::info!("Registered user {} ({})", user.id, user.username);

    let response = AuthResponse::new(&user, &state.encoding_key, state.token_duration)?;

    Ok((StatusCode::CREATED, Json(response)))
}
