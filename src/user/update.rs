//! Partial updates to a user's game state.

use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    Error,
    progression::{MAX_LEVEL, MAX_STREAK},
    user::{User, UserID, get_user_by_id, save_user},
};

/// The smallest allowed experience requirement for the next level.
///
/// Any value at least this large strictly grows on level-up, which keeps
/// [crate::progression::apply_experience] finite.
pub const MIN_MAX_EXPERIENCE: f64 = 2.0;

/// The fields of a user that may be overwritten directly.
///
/// Missing fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    /// Current health, no greater than max health.
    pub health: Option<f64>,
    /// Greater than zero.
    pub max_health: Option<f64>,
    /// Less than max experience.
    pub experience: Option<f64>,
    /// At least [MIN_MAX_EXPERIENCE].
    pub max_experience: Option<f64>,
    /// At least one and at most [MAX_LEVEL].
    pub level: Option<u32>,
    /// No less than zero.
    pub attack: Option<f64>,
    /// No less than zero.
    pub defense: Option<f64>,
    /// No less than zero.
    pub coins: Option<f64>,
    /// Days in a row, at most [MAX_STREAK].
    pub streak: Option<u32>,
    /// Replaces the whole achievement list.
    pub achievements: Option<Vec<String>>,
    /// RFC 3339 timestamp of the last streak evaluation.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_activity_date: Option<OffsetDateTime>,
    /// Transactions recorded so far.
    pub transactions_registered: Option<u32>,
    /// Challenges completed so far.
    pub challenges_completed: Option<u32>,
    /// No less than zero.
    pub total_coins_earned: Option<f64>,
}

impl UserUpdate {
    /// Apply the update to `user`, returning the updated user.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidField] if a value is out of range or the
    /// result breaks `health <= max_health` or `experience < max_experience`.
    pub fn apply(self, mut user: User) -> Result<User, Error> {
        let progress = &mut user.progress;

        if let Some(level) = self.level {
            if !(1..=MAX_LEVEL).contains(&level) {
                return Err(Error::InvalidField(format!(
                    "level must be between 1 and {MAX_LEVEL}"
                )));
            }
            progress.level = level;
        }

        set_non_negative("health", &mut progress.health, self.health)?;
        set_non_negative("experience", &mut progress.experience, self.experience)?;
        set_non_negative("attack", &mut progress.attack, self.attack)?;
        set_non_negative("defense", &mut progress.defense, self.defense)?;
        set_non_negative("coins", &mut progress.coins, self.coins)?;
        set_non_negative(
            "total_coins_earned",
            &mut user.total_coins_earned,
            self.total_coins_earned,
        )?;

        if let Some(max_health) = self.max_health {
            if !max_health.is_finite() || max_health <= 0.0 {
                return Err(Error::InvalidField(
                    "max_health must be greater than 0".to_owned(),
                ));
            }
            progress.max_health = max_health;
        }

        if let Some(max_experience) = self.max_experience {
            if !max_experience.is_finite() || max_experience < MIN_MAX_EXPERIENCE {
                return Err(Error::InvalidField(format!(
                    "max_experience must be at least {MIN_MAX_EXPERIENCE}"
                )));
            }
            progress.max_experience = max_experience;
        }

        if progress.health > progress.max_health {
            return Err(Error::InvalidField(
                "health must not be greater than max_health".to_owned(),
            ));
        }

        if progress.experience >= progress.max_experience {
            return Err(Error::InvalidField(
                "experience must be less than max_experience".to_owned(),
            ));
        }

        if let Some(streak) = self.streak {
            if streak > MAX_STREAK {
                return Err(Error::InvalidField(format!(
                    "streak must be at most {MAX_STREAK}"
                )));
            }
            progress.streak = streak;
        }

        if let Some(last_activity_date) = self.last_activity_date {
            progress.last_activity_date = last_activity_date;
        }

        if let Some(achievements) = self.achievements {
            user.achievements = achievements;
        }

        if let Some(count) = self.transactions_registered {
            user.transactions_registered = count;
        }

        if let Some(count) = self.challenges_completed {
            user.challenges_completed = count;
        }

        Ok(user)
    }
}

/// Apply `update` to the stored user `user_id` and save the result.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist, [Error::InvalidField]
/// if the update is invalid, or an SQL error.
pub fn update_user(
    user_id: UserID,
    update: UserUpdate,
    now: OffsetDateTime,
    connection: &mut Connection,
) -> Result<User, Error> {
    let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let user = update.apply(get_user_by_id(user_id, &transaction)?)?;
    let user = save_user(&user, now, &transaction)?;
    transaction.commit()?;

    Ok(user)
}

fn set_non_negative(field: &str, target: &mut f64, value: Option<f64>) -> Result<(), Error> {
    match value {
        Some(value) if !value.is_finite() || value < 0.0 => Err(Error::InvalidField(format!(
            "{field} must be a number no less than 0"
        ))),
        Some(value) => {
            *target = value;
            Ok(())
        }
        None => Ok(()),
    }
}
