//! The RPG progression rules: experience with level-up rollover, and daily
//! activity streaks that pay out bonus coins.
//!
//! Both rules are pure functions over a [UserProgress] snapshot. Loading the
//! snapshot and saving the result is up to the caller, see
//! [crate::user::award_experience] and [crate::user::record_activity].

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::Error;

/// The level every new user starts at.
pub const STARTING_LEVEL: u32 = 1;
/// The experience needed to reach level two.
pub const STARTING_MAX_EXPERIENCE: f64 = 100.0;
/// The health a new user starts with.
pub const STARTING_MAX_HEALTH: f64 = 100.0;
/// The attack a new user starts with.
pub const STARTING_ATTACK: f64 = 10.0;
/// The defense a new user starts with.
pub const STARTING_DEFENSE: f64 = 5.0;

/// How much the experience needed for the next level grows per level-up.
pub const MAX_EXPERIENCE_GROWTH: f64 = 1.5;
/// Max health gained per level-up.
pub const LEVEL_UP_HEALTH: f64 = 10.0;
/// Attack gained per level-up.
pub const LEVEL_UP_ATTACK: f64 = 2.0;
/// Defense gained per level-up.
pub const LEVEL_UP_DEFENSE: f64 = 1.0;

/// Activity must be strictly further apart than this to extend a streak.
pub const STREAK_WINDOW: Duration = Duration::hours(24);
/// The number of streak days that make up one bonus week.
pub const STREAK_DAYS_PER_BONUS: u32 = 7;
/// Coins paid per completed streak week, every time the streak is extended.
pub const STREAK_BONUS_COINS: f64 = 5.0;

/// Levels stop counting up here.
pub const MAX_LEVEL: u32 = i32::MAX as u32;
/// Streaks stop counting up here.
pub const MAX_STREAK: u32 = i32::MAX as u32;

/// The RPG attributes of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    /// The user's level, starting at one.
    pub level: u32,
    /// Experience collected towards the next level.
    pub experience: f64,
    /// The experience needed for the next level.
    pub max_experience: f64,
    /// Current health points.
    pub health: f64,
    /// The upper limit for `health`.
    pub max_health: f64,
    /// Attack power.
    pub attack: f64,
    /// Defense power.
    pub defense: f64,
    /// In-game currency.
    pub coins: f64,
    /// The number of activity days in a row.
    pub streak: u32,
    /// When the streak was last evaluated.
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_date: OffsetDateTime,
}

impl UserProgress {
    /// The progress of a freshly registered user whose last activity is `now`.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            level: STARTING_LEVEL,
            experience: 0.0,
            max_experience: STARTING_MAX_EXPERIENCE,
            health: STARTING_MAX_HEALTH,
            max_health: STARTING_MAX_HEALTH,
            attack: STARTING_ATTACK,
            defense: STARTING_DEFENSE,
            coins: 0.0,
            streak: 0,
            last_activity_date: now,
        }
    }
}

/// An amount of experience that is safe to feed to [apply_experience].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperienceGain(f64);

impl ExperienceGain {
    /// Validate a raw experience grant.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidArgument] if `amount` is negative, NaN or infinite.
    pub fn new(amount: f64) -> Result<Self, Error> {
        if !amount.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "experience must be a finite number, got {amount}"
            )));
        }

        if amount < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "experience must not be negative, got {amount}"
            )));
        }

        Ok(Self(amount))
    }

    /// The validated amount.
    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

/// Add `gained` experience to `progress`, levelling up as many times as the
/// total allows.
///
/// Surplus experience carries over into the next level. Each level-up grows
/// the experience needed for the next one by [MAX_EXPERIENCE_GROWTH]
/// (rounded down), raises max health, attack and defense, and fully heals.
///
/// `gained` must be non-negative and `progress.max_experience` at least 2,
/// otherwise the loop may not terminate. Use [ExperienceGain] to check grants
/// coming from outside.
pub fn apply_experience(mut progress: UserProgress, gained: f64) -> UserProgress {
    progress.experience += gained;

    while progress.experience >= progress.max_experience {
        progress.level = count_up(progress.level, MAX_LEVEL);
        progress.experience -= progress.max_experience;
        progress.max_experience = (progress.max_experience * MAX_EXPERIENCE_GROWTH).floor();
        progress.max_health += LEVEL_UP_HEALTH;
        progress.health = progress.max_health;
        progress.attack += LEVEL_UP_ATTACK;
        progress.defense += LEVEL_UP_DEFENSE;
    }

    progress
}

/// Record activity at `now`.
///
/// If more than [STREAK_WINDOW] has passed since the last activity the
/// streak grows by one and pays [STREAK_BONUS_COINS] for every completed
/// week of the new streak. The last activity date is always moved to `now`.
///
/// Elapsed time is compared at millisecond precision.
pub fn apply_streak_tick(mut progress: UserProgress, now: OffsetDateTime) -> UserProgress {
    let elapsed_ms = (now - progress.last_activity_date).whole_milliseconds();

    if elapsed_ms > STREAK_WINDOW.whole_milliseconds() {
        progress.streak = count_up(progress.streak, MAX_STREAK);
        let completed_weeks = progress.streak / STREAK_DAYS_PER_BONUS;
        progress.coins += f64::from(completed_weeks) * STREAK_BONUS_COINS;
    }

    progress.last_activity_date = now;

    progress
}

/// Add one to `value` unless it has already reached `cap`.
fn count_up(value: u32, cap: u32) -> u32 {
    if value >= cap { value } else { value + 1 }
}

#[cfg(test)]
mod experience_tests {
    use time::macros::datetime;

    use crate::{
        Error,
        progression::{ExperienceGain, MAX_LEVEL, UserProgress, apply_experience},
    };

    fn level_one() -> UserProgress {
        UserProgress::new(datetime!(2025-06-01 12:00 UTC))
    }

    #[test]
    fn gain_below_threshold_only_adds_experience() {
        let progress = UserProgress {
            experience: 40.0,
            ..level_one()
        };

        let got = apply_experience(progress.clone(), 59.0);

        assert_eq!(got.experience, 99.0);
        assert_eq!(got.level, progress.level);
        assert_eq!(got.max_experience, progress.max_experience);
        assert_eq!(got.max_health, progress.max_health);
        assert_eq!(got.attack, progress.attack);
        assert_eq!(got.defense, progress.defense);
    }

    #[test]
    fn level_up_carries_over_surplus() {
        let progress = UserProgress {
            level: 1,
            experience: 90.0,
            max_experience: 100.0,
            health: 37.0,
            max_health: 100.0,
            attack: 10.0,
            defense: 5.0,
            ..level_one()
        };

        let got = apply_experience(progress, 30.0);

        assert_eq!(got.experience, 20.0);
        assert_eq!(got.level, 2);
        assert_eq!(got.max_experience, 150.0);
        assert_eq!(got.max_health, 110.0);
        assert_eq!(got.health, 110.0);
        assert_eq!(got.attack, 12.0);
        assert_eq!(got.defense, 6.0);
    }

    #[test]
    fn exact_threshold_levels_up_with_no_surplus() {
        let got = apply_experience(level_one(), 100.0);

        assert_eq!(got.level, 2);
        assert_eq!(got.experience, 0.0);
    }

    #[test]
    fn large_gain_crosses_several_levels() {
        // 100 + 150 + 225 = 475 to reach level 4, next threshold is 337.
        let got = apply_experience(level_one(), 500.0);

        assert_eq!(got.level, 4);
        assert_eq!(got.experience, 25.0);
        assert_eq!(got.max_experience, 337.0);
        assert_eq!(got.max_health, 130.0);
        assert_eq!(got.health, 130.0);
        assert_eq!(got.attack, 16.0);
        assert_eq!(got.defense, 8.0);
        assert!(got.experience < got.max_experience);
    }

    #[test]
    fn max_experience_is_floored() {
        let progress = UserProgress {
            max_experience: 337.0,
            ..level_one()
        };

        let got = apply_experience(progress, 337.0);

        assert_eq!(got.max_experience, 505.0);
    }

    #[test]
    fn zero_gain_changes_nothing() {
        let progress = level_one();

        assert_eq!(apply_experience(progress.clone(), 0.0), progress);
    }

    #[test]
    fn level_ups_match_thresholds_crossed() {
        let mut progress = level_one();
        let mut thresholds_crossed = 0;
        let mut remaining = 10_000.0;
        let mut threshold = progress.max_experience;

        while remaining >= threshold {
            remaining -= threshold;
            threshold = (threshold * 1.5_f64).floor();
            thresholds_crossed += 1;
        }

        progress = apply_experience(progress, 10_000.0);

        assert_eq!(progress.level, 1 + thresholds_crossed);
        assert_eq!(progress.experience, remaining);
        assert_eq!(progress.max_experience, threshold);
    }

    #[test]
    fn level_stops_at_max_level() {
        let progress = UserProgress {
            level: MAX_LEVEL - 1,
            ..level_one()
        };

        let got = apply_experience(progress, 500.0);

        assert_eq!(got.level, MAX_LEVEL);
        assert_eq!(got.experience, 25.0);
        assert_eq!(got.max_experience, 337.0);
        assert_eq!(got.attack, 16.0);
    }

    #[test]
    fn level_never_wraps_around() {
        let progress = UserProgress {
            level: u32::MAX,
            ..level_one()
        };

        let got = apply_experience(progress, 100.0);

        assert_eq!(got.level, u32::MAX);
        assert_eq!(got.experience, 0.0);
        assert_eq!(got.max_experience, 150.0);
    }

    #[test]
    fn experience_gain_rejects_negative() {
        assert!(matches!(
            ExperienceGain::new(-1.0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn experience_gain_rejects_non_finite() {
        assert!(matches!(
            ExperienceGain::new(f64::NAN),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ExperienceGain::new(f64::INFINITY),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn experience_gain_accepts_zero() {
        assert_eq!(ExperienceGain::new(0.0).unwrap().as_f64(), 0.0);
    }
}
