//! Users, their game progress, and the endpoints for managing them.

mod core;
mod endpoints;
mod progress;
mod update;

pub use core::{
    MIN_NAME_LENGTH, MIN_USERNAME_LENGTH, NewUser, Role, User, UserID, create_user,
    create_user_table, get_user_by_email, get_user_by_id, list_users, save_user, set_password,
    set_role, soft_delete_user,
};
pub use endpoints::{
    AchievementData, ExperienceData, UserData, UserResponse, UserState, add_achievement_endpoint,
    award_experience_endpoint, create_user_endpoint, delete_user_endpoint, get_user_endpoint,
    list_users_endpoint, record_activity_endpoint, update_user_endpoint,
};
pub use progress::{add_achievement, award_experience, record_activity};
pub use update::{MIN_MAX_EXPERIENCE, UserUpdate, update_user};

#[cfg(test)]
pub(crate) use core::test_utils;
