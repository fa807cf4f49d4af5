//! This file defines types that handle password validation and hashing.
//! `ValidatedPassword` wraps a string and ensures it meets the password policy.
//! `PasswordHash` converts a `ValidatedPassword` into a salted and hashed password.

use std::fmt::Display;

use bcrypt::{BcryptError, hash, verify};
use serde::{Deserialize, Serialize};

use crate::Error;

/// The minimum number of characters in a password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// The special characters a password may contain, at least one is required.
pub const PASSWORD_SPECIAL_CHARACTERS: &str = "@$!%*?&";

/// A password that has been validated, but not yet hashed.
///
/// This struct can be used to construct a [PasswordHash].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPassword(String);

impl ValidatedPassword {
    /// Create and validate a new password from a string.
    ///
    /// A valid password has at least [MIN_PASSWORD_LENGTH] characters, and
    /// contains a lowercase letter, an uppercase letter, a digit and one of
    /// [PASSWORD_SPECIAL_CHARACTERS]. No other characters are allowed.
    ///
    /// # Errors
    ///
    /// This function will return an error if the password does not meet the policy.
    /// The error message explains what is missing.
    pub fn new(raw_password_string: &str) -> Result<Self, Error> {
        let is_special = |c: char| PASSWORD_SPECIAL_CHARACTERS.contains(c);

        if raw_password_string.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::TooWeak(format!(
                "use at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        if let Some(c) = raw_password_string
            .chars()
            .find(|&c| !c.is_ascii_alphanumeric() && !is_special(c))
        {
            return Err(Error::TooWeak(format!(
                "'{c}' is not allowed, use letters, digits and {PASSWORD_SPECIAL_CHARACTERS}"
            )));
        }

        let has_lowercase = raw_password_string.chars().any(|c| c.is_ascii_lowercase());
        let has_uppercase = raw_password_string.chars().any(|c| c.is_ascii_uppercase());
        let has_digit = raw_password_string.chars().any(|c| c.is_ascii_digit());
        let has_special = raw_password_string.chars().any(is_special);

        if !(has_lowercase && has_uppercase && has_digit && has_special) {
            return Err(Error::TooWeak(format!(
                "password must contain at least one uppercase letter, one lowercase letter, \
                one number and one of {PASSWORD_SPECIAL_CHARACTERS}"
            )));
        }

        Ok(Self(raw_password_string.to_string()))
    }

    /// Create a new `ValidatedPassword` without any validation.
    ///
    /// The caller should ensure that `raw_password_string` is a valid and secure password.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if an invalid password is provided it may cause incorrect behaviour but will not affect memory safety.
    pub fn new_unchecked(raw_password_string: &str) -> Self {
        Self(raw_password_string.to_string())
    }
}

impl Display for ValidatedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", str::repeat("*", 8))
    }
}

/// A salted and hashed password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// An alias for the default encryption cost for hashing passwords.
    pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

    /// Create a hashed password from a validated password with the specified `cost`.
    ///
    /// `cost` increases the rounds of hashing and therefore the time needed to verify a password.
    /// A value of at least 12 is recommended. Pass in [PasswordHash::DEFAULT_COST] to use the recommended cost.
    ///
    /// # Errors
    ///
    /// This function will return an error if the password could not be hashed.
    pub fn new(password: ValidatedPassword, cost: u32) -> Result<Self, Error> {
        match hash(&password.0, cost) {
            Ok(password_hash) => Ok(Self(password_hash)),
            Err(e) => Err(Error::HashingError(e.to_string())),
        }
    }

    /// Create a new `PasswordHash` without any validation.
    ///
    /// The caller should ensure that `raw_password_hash` is a valid password hash.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if an invalid hash is provided it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(raw_password_hash: &str) -> Self {
        Self(raw_password_hash.to_string())
    }

    /// Try to create a password hash from a raw password string.
    ///
    /// This is a convenience function that removes the need to manually create
    /// the intermediate `ValidatedPassword` type.
    pub fn from_raw_password(raw_password: &str, cost: u32) -> Result<Self, Error> {
        let validated_password = ValidatedPassword::new(raw_password)?;
        PasswordHash::new(validated_password, cost)
    }

    /// Check that `raw_password` matches the stored password.
    pub fn verify(&self, raw_password: &str) -> Result<bool, BcryptError> {
        verify(raw_password, &self.0)
    }
}

impl AsRef<str> for PasswordHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
