//! The user model and the queries for creating, fetching and saving users.

use std::fmt::Display;

use email_address::EmailAddress;
use rusqlite::{
    Connection, Row, params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use crate::{Error, PasswordHash, progression::UserProgress};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a user is allowed to do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A regular player, may only touch their own records.
    #[default]
    User,
    /// May list and delete users, and access any record.
    Admin,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// A registered user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The unique display name.
    pub username: String,
    /// The unique email address used to log in.
    pub email: String,
    /// The user's first name.
    pub first_name: String,
    /// The user's last name.
    pub last_name: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// What the user is allowed to do.
    pub role: Role,
    /// Level, experience, streak and the other RPG attributes.
    pub progress: UserProgress,
    /// Names of the achievements the user has unlocked, in unlock order.
    pub achievements: Vec<String>,
    /// How many transactions the user has recorded.
    pub transactions_registered: u32,
    /// How many challenges the user has completed.
    pub challenges_completed: u32,
    /// All coins the user has ever earned.
    pub total_coins_earned: f64,
    /// When the user registered.
    pub created_at: OffsetDateTime,
    /// When the user record last changed.
    pub updated_at: OffsetDateTime,
}

/// The validated fields needed to register a user.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    /// At least three characters.
    pub username: String,
    /// A valid email address.
    pub email: String,
    /// At least two characters.
    pub first_name: String,
    /// At least two characters.
    pub last_name: String,
    /// The hash of a password that met the password policy.
    pub password_hash: PasswordHash,
}

/// The minimum number of characters in a username.
pub const MIN_USERNAME_LENGTH: usize = 3;
/// The minimum number of characters in a first or last name.
pub const MIN_NAME_LENGTH: usize = 2;

impl NewUser {
    /// Validate the identity fields of a new user.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidField] if a name is too short, or
    /// [Error::InvalidEmail] if `email` is not a valid address.
    pub fn new(
        username: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
        password_hash: PasswordHash,
    ) -> Result<Self, Error> {
        check_min_length("username", username, MIN_USERNAME_LENGTH)?;
        check_min_length("first_name", first_name, MIN_NAME_LENGTH)?;
        check_min_length("last_name", last_name, MIN_NAME_LENGTH)?;

        let email = email.trim();
        if !EmailAddress::is_valid(email) {
            return Err(Error::InvalidEmail(email.to_owned()));
        }

        Ok(Self {
            username: username.trim().to_owned(),
            email: email.to_owned(),
            first_name: first_name.trim().to_owned(),
            last_name: last_name.trim().to_owned(),
            password_hash,
        })
    }
}

fn check_min_length(field: &str, value: &str, min_length: usize) -> Result<(), Error> {
    if value.trim().chars().count() < min_length {
        return Err(Error::InvalidField(format!(
            "{field} must be at least {min_length} characters long"
        )));
    }

    Ok(())
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                password TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                level INTEGER NOT NULL,
                experience REAL NOT NULL,
                max_experience REAL NOT NULL,
                health REAL NOT NULL,
                max_health REAL NOT NULL,
                attack REAL NOT NULL,
                defense REAL NOT NULL,
                coins REAL NOT NULL,
                streak INTEGER NOT NULL,
                last_activity_date TEXT NOT NULL,
                achievements TEXT NOT NULL DEFAULT '[]',
                transactions_registered INTEGER NOT NULL DEFAULT 0,
                challenges_completed INTEGER NOT NULL DEFAULT 0,
                total_coins_earned REAL NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password, role, \
    level, experience, max_experience, health, max_health, attack, defense, coins, streak, \
    last_activity_date, achievements, transactions_registered, challenges_completed, \
    total_coins_earned, created_at, updated_at";

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(5)?;
    let raw_achievements: String = row.get(17)?;
    let achievements = serde_json::from_str(&raw_achievements)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(17, Type::Text, error.into()))?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        role: row.get(6)?,
        progress: UserProgress {
            level: row.get(7)?,
            experience: row.get(8)?,
            max_experience: row.get(9)?,
            health: row.get(10)?,
            max_health: row.get(11)?,
            attack: row.get(12)?,
            defense: row.get(13)?,
            coins: row.get(14)?,
            streak: row.get(15)?,
            last_activity_date: row.get(16)?,
        },
        achievements,
        transactions_registered: row.get(18)?,
        challenges_completed: row.get(19)?,
        total_coins_earned: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

fn encode_achievements(achievements: &[String]) -> Result<String, Error> {
    serde_json::to_string(achievements).map_err(|error| {
        Error::InvalidField(format!("could not serialize achievements: {error}"))
    })
}

/// Create and insert a new user into the database.
///
/// The user starts with the default [UserProgress] and last activity at `now`.
///
/// # Errors
///
/// Returns a:
/// - [Error::DuplicateUser] if the email or username is already taken,
/// - or [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(
    new_user: NewUser,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<User, Error> {
    let now = now.to_offset(UtcOffset::UTC);
    let progress = UserProgress::new(now);

    connection
        .execute(
            "INSERT INTO user (
                username, email, first_name, last_name, password, role,
                level, experience, max_experience, health, max_health, attack, defense,
                coins, streak, last_activity_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                new_user.username,
                new_user.email,
                new_user.first_name,
                new_user.last_name,
                new_user.password_hash.as_ref(),
                Role::User,
                progress.level,
                progress.experience,
                progress.max_experience,
                progress.health,
                progress.max_health,
                progress.attack,
                progress.defense,
                progress.coins,
                progress.streak,
                progress.last_activity_date,
                now,
                now,
            ],
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateUser,
            error => error.into(),
        })?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        username: new_user.username,
        email: new_user.email,
        first_name: new_user.first_name,
        last_name: new_user.last_name,
        password_hash: new_user.password_hash,
        role: Role::User,
        progress,
        achievements: Vec::new(),
        transactions_registered: 0,
        challenges_completed: 0,
        total_coins_earned: 0.0,
        created_at: now,
        updated_at: now,
    })
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// Soft-deleted users are treated as missing.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!(
            "SELECT {USER_COLUMNS} FROM user WHERE id = :id AND is_deleted = 0"
        ))?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user with the email address `email`.
///
/// Soft-deleted users are treated as missing.
///
/// # Errors
///
/// Returns [Error::NotFound] if no active user has that email address.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!(
            "SELECT {USER_COLUMNS} FROM user WHERE email = :email AND is_deleted = 0"
        ))?
        .query_row(&[(":email", &email.trim())], map_user_row)
        .map_err(|error| error.into())
}

/// Get all users that have not been deleted, ordered by ID.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn list_users(connection: &Connection) -> Result<Vec<User>, Error> {
    connection
        .prepare(&format!(
            "SELECT {USER_COLUMNS} FROM user WHERE is_deleted = 0 ORDER BY id ASC"
        ))?
        .query_map([], map_user_row)?
        .map(|maybe_user| maybe_user.map_err(Error::from))
        .collect()
}

/// Overwrite the game state and bookkeeping fields of `user`.
///
/// Identity fields (username, email, names, password, role) are not written.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist or has been deleted.
pub fn save_user(user: &User, now: OffsetDateTime, connection: &Connection) -> Result<User, Error> {
    let now = now.to_offset(UtcOffset::UTC);
    let progress = &user.progress;

    let rows_affected = connection.execute(
        "UPDATE user SET
            level = ?1, experience = ?2, max_experience = ?3, health = ?4, max_health = ?5,
            attack = ?6, defense = ?7, coins = ?8, streak = ?9, last_activity_date = ?10,
            achievements = ?11, transactions_registered = ?12, challenges_completed = ?13,
            total_coins_earned = ?14, updated_at = ?15
        WHERE id = ?16 AND is_deleted = 0",
        params![
            progress.level,
            progress.experience,
            progress.max_experience,
            progress.health,
            progress.max_health,
            progress.attack,
            progress.defense,
            progress.coins,
            progress.streak,
            progress.last_activity_date.to_offset(UtcOffset::UTC),
            encode_achievements(&user.achievements)?,
            user.transactions_registered,
            user.challenges_completed,
            user.total_coins_earned,
            now,
            user.id.as_i64(),
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(User {
        progress: UserProgress {
            last_activity_date: progress.last_activity_date.to_offset(UtcOffset::UTC),
            ..progress.clone()
        },
        updated_at: now,
        ..user.clone()
    })
}

/// Mark the user as deleted without removing their row.
///
/// The email and username stay reserved.
///
/// # Errors
///
/// Returns [Error::DeleteMissingUser] if the user does not exist or is already deleted.
pub fn soft_delete_user(
    user_id: UserID,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET is_deleted = 1, updated_at = ?1 WHERE id = ?2 AND is_deleted = 0",
        (now.to_offset(UtcOffset::UTC), user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingUser);
    }

    Ok(())
}

/// Set the role of the active user with the email address `email`.
///
/// # Errors
///
/// Returns [Error::NotFound] if no active user has that email address.
pub fn set_role(email: &str, role: Role, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET role = ?1 WHERE email = ?2 AND is_deleted = 0",
        (role, email.trim()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Replace the password of the active user `user_id`.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist or has been deleted.
pub fn set_password(
    user_id: UserID,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET password = ?1 WHERE id = ?2 AND is_deleted = 0",
        (password_hash.as_ref(), user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}
