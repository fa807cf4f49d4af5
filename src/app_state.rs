//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use jsonwebtoken::{DecodingKey, EncodingKey};
use rusqlite::Connection;
use time::Duration;

use crate::{Error, db::initialize};

/// The default duration for which access tokens are valid.
pub const DEFAULT_TOKEN_DURATION: Duration = Duration::hours(1);

/// The keys for signing and verifying JSON Web Tokens.
#[derive(Clone)]
pub struct JwtKeys {
    /// Signs new tokens.
    pub encoding_key: EncodingKey,
    /// Verifies tokens sent by clients.
    pub decoding_key: DecodingKey,
}

impl JwtKeys {
    /// Derive both keys from a shared `secret`.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The keys used to sign and verify access tokens.
    pub jwt_keys: JwtKeys,

    /// The duration for which access tokens are valid.
    pub token_duration: Duration,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        jwt_secret: &str,
        token_duration: Duration,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            jwt_keys: JwtKeys::from_secret(jwt_secret),
            token_duration,
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }
}
