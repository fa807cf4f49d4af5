//! Rules for who may read or change which records.

use rusqlite::Connection;

use crate::{
    Error,
    auth::Claims,
    user::{Role, User, UserID, get_user_by_id},
};

/// Load the user that `claims` was issued to.
///
/// # Errors
///
/// Returns [Error::InvalidToken] if the user has since been deleted.
pub fn current_user(claims: &Claims, connection: &Connection) -> Result<User, Error> {
    get_user_by_id(claims.sub, connection).map_err(|error| match error {
        Error::NotFound => Error::InvalidToken,
        error => error,
    })
}

/// Check that `actor` may access records owned by `owner`.
///
/// Admins may access everything, other users only their own records.
///
/// # Errors
///
/// Returns [Error::NotFound] rather than [Error::Forbidden] so that clients
/// cannot probe for other users' records.
pub fn ensure_can_access(actor: &User, owner: UserID) -> Result<(), Error> {
    if actor.role == Role::Admin || actor.id == owner {
        Ok(())
    } else {
        tracing::debug!("User {} tried to access a record of user {owner}", actor.id);
        Err(Error::NotFound)
    }
}

/// Check that `actor` is an admin.
///
/// # Errors
///
/// Returns [Error::Forbidden] for regular users.
pub fn ensure_admin(actor: &User) -> Result<(), Error> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::User => Err(Error::Forbidden),
    }
}
