//! finquest is the REST API for a gamified personal-finance tracker.
//!
//! Users record their income and expenses and are rewarded with experience,
//! levels, daily streaks and coins. The progression rules live in
//! [progression], everything else is a thin layer of JSON endpoints over a
//! SQLite database.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod auth;
mod database_id;
mod db;
mod endpoints;
mod health;
mod logging;
mod password;
pub mod progression;
mod routing;
#[cfg(test)]
mod test_utils;
pub mod transaction;
pub mod user;

pub use app_state::{AppState, DEFAULT_TOKEN_DURATION};
pub use database_id::{DatabaseId, TransactionId};
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use password::{PasswordHash, ValidatedPassword};
pub use routing::build_router;
pub use transaction::{Transaction, TransactionCategory, TransactionType};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The email is not registered or the password is wrong.
    ///
    /// The two cases are deliberately indistinguishable to the client.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The request did not include a bearer token.
    #[error("missing bearer token")]
    MissingToken,

    /// The bearer token could not be decoded, has a bad signature or has expired.
    #[error("invalid token")]
    InvalidToken,

    /// The JWT library failed to sign a token.
    ///
    /// The error string should only be logged on the server.
    #[error("could not create token: {0}")]
    TokenCreation(String),

    /// The user provided a password that does not meet the password policy.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The email address is not valid.
    #[error("{0} is not a valid email address")]
    InvalidEmail(String),

    /// A field in the request body failed validation.
    #[error("{0}")]
    InvalidField(String),

    /// An input to the progression rules was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A user with the same email or username already exists.
    #[error("a user already exists with this email or username")]
    DuplicateUser,

    /// The authenticated user is not allowed to perform the action.
    #[error("you do not have permission to do that")]
    Forbidden,

    /// The transaction category does not belong to the transaction type.
    #[error("the category {category} cannot be used for {transaction_type} transactions")]
    CategoryTypeMismatch {
        /// The category in the request.
        category: TransactionCategory,
        /// The type in the request.
        transaction_type: TransactionType,
    },

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to delete a user that does not exist or is already deleted
    #[error("tried to delete a user that is not in the database")]
    DeleteMissingUser,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials | Error::MissingToken | Error::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Error::TooWeak(_)
            | Error::InvalidEmail(_)
            | Error::InvalidField(_)
            | Error::InvalidArgument(_)
            | Error::CategoryTypeMismatch { .. } => StatusCode::BAD_REQUEST,
            Error::DuplicateUser => StatusCode::CONFLICT,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound
            | Error::UpdateMissingTransaction
            | Error::DeleteMissingTransaction
            | Error::DeleteMissingUser => StatusCode::NOT_FOUND,
            Error::TokenCreation(_)
            | Error::HashingError(_)
            | Error::SqlError(_)
            | Error::DatabaseLockError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Internal details are not intended to be shown to the client.
            tracing::error!("An unexpected error occurred: {}", self);
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
