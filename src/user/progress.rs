//! Loads a user, runs the progression rules on them and saves the result.
//!
//! Each operation runs inside one SQLite transaction on a connection that the
//! caller holds exclusively, so two requests for the same user cannot
//! interleave their read and write.

use rusqlite::{Connection, TransactionBehavior};
use time::OffsetDateTime;

use crate::{
    Error,
    progression::{ExperienceGain, apply_experience, apply_streak_tick},
    user::{User, UserID, get_user_by_id, save_user},
};

/// Give `user_id` experience and persist any level-ups.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist, or an SQL error.
pub fn award_experience(
    user_id: UserID,
    gained: ExperienceGain,
    now: OffsetDateTime,
    connection: &mut Connection,
) -> Result<User, Error> {
    let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let user = get_user_by_id(user_id, &transaction)?;
    let previous_level = user.progress.level;
    let progress = apply_experience(user.progress.clone(), gained.as_f64());

    let user = save_user(&User { progress, ..user }, now, &transaction)?;
    transaction.commit()?;

    if user.progress.level > previous_level {
        tracing::info!(
            "User {user_id} levelled up from {previous_level} to {}",
            user.progress.level
        );
    } else {
        tracing::debug!(
            "User {user_id} gained {} experience, now {}/{}",
            gained.as_f64(),
            user.progress.experience,
            user.progress.max_experience
        );
    }

    Ok(user)
}

/// Record activity for `user_id` at `now`, extending their streak if a new
/// activity day has started.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist, or an SQL error.
pub fn record_activity(
    user_id: UserID,
    now: OffsetDateTime,
    connection: &mut Connection,
) -> Result<User, Error> {
    let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let user = get_user_by_id(user_id, &transaction)?;
    let previous_streak = user.progress.streak;
    let previous_coins = user.progress.coins;
    let progress = apply_streak_tick(user.progress.clone(), now);

    let user = save_user(&User { progress, ..user }, now, &transaction)?;
    transaction.commit()?;

    if user.progress.streak > previous_streak {
        tracing::info!(
            "User {user_id} extended their streak to {} and earned {} bonus coins",
            user.progress.streak,
            user.progress.coins - previous_coins
        );
    }

    Ok(user)
}

/// Unlock `achievement` for `user_id`.
///
/// Unlocking an achievement the user already has leaves the user untouched.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist, or an SQL error.
pub fn add_achievement(
    user_id: UserID,
    achievement: &str,
    now: OffsetDateTime,
    connection: &mut Connection,
) -> Result<User, Error> {
    let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut user = get_user_by_id(user_id, &transaction)?;
    if user.achievements.iter().any(|unlocked| unlocked == achievement) {
        return Ok(user);
    }

    user.achievements.push(achievement.to_owned());
    let user = save_user(&user, now, &transaction)?;
    transaction.commit()?;

    tracing::info!("User {user_id} unlocked the achievement {achievement:?}");

    Ok(user)
}
