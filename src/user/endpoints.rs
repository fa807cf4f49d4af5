//! The JSON endpoints for managing users and their game progress.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{
    AppState, Error, PasswordHash,
    auth::{Claims, current_user, ensure_admin, ensure_can_access},
    progression::{ExperienceGain, UserProgress},
    user::{
        NewUser, Role, User, UserID, UserUpdate, add_achievement, award_experience, create_user,
        get_user_by_id, list_users, record_activity, soft_delete_user, update_user,
    },
};

/// The state needed by the user endpoints.
#[derive(Debug, Clone)]
pub struct UserState {
    /// The database connection for managing users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for UserState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A user as it is sent to clients. Never includes the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    /// The user's ID.
    pub id: UserID,
    /// The unique display name.
    pub username: String,
    /// The unique email address.
    pub email: String,
    /// The user's first name.
    pub first_name: String,
    /// The user's last name.
    pub last_name: String,
    /// What the user is allowed to do.
    pub role: Role,
    /// The RPG attributes, inlined into the user object.
    #[serde(flatten)]
    pub progress: UserProgress,
    /// Unlocked achievements.
    pub achievements: Vec<String>,
    /// How many transactions the user has recorded.
    pub transactions_registered: u32,
    /// How many challenges the user has completed.
    pub challenges_completed: u32,
    /// All coins the user has ever earned.
    pub total_coins_earned: f64,
    /// When the user registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the user record last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            progress: user.progress.clone(),
            achievements: user.achievements.clone(),
            transactions_registered: user.transactions_registered,
            challenges_completed: user.challenges_completed,
            total_coins_earned: user.total_coins_earned,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// The data for registering a new user.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserData {
    /// At least three characters.
    pub username: String,
    /// A valid email address.
    pub email: String,
    /// At least two characters.
    pub first_name: String,
    /// At least two characters.
    pub last_name: String,
    /// The raw password, checked against the password policy before hashing.
    pub password: String,
}

impl UserData {
    /// Check the fields and hash the password.
    ///
    /// # Errors
    ///
    /// Returns [Error::TooWeak] for a password that breaks the password
    /// policy, [Error::InvalidField] or [Error::InvalidEmail] for the other
    /// fields, or [Error::HashingError] if hashing failed.
    pub fn into_new_user(self) -> Result<NewUser, Error> {
        let password_hash =
            PasswordHash::from_raw_password(&self.password, PasswordHash::DEFAULT_COST)?;

        NewUser::new(
            &self.username,
            &self.email,
            &self.first_name,
            &self.last_name,
            password_hash,
        )
    }
}

/// The body of a request to award experience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceData {
    /// The experience to add, must not be negative.
    pub experience: f64,
}

/// The body of a request to unlock an achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementData {
    /// The name of the achievement.
    pub achievement: String,
}

/// A route handler for creating a new user on behalf of a logged in user.
///
/// # Errors
///
/// Returns [Error::DuplicateUser] if the email or username is taken, or a
/// validation error if the data is invalid.
pub async fn create_user_endpoint(
    State(state): State<UserState>,
    claims: Claims,
    Json(user_data): Json<UserData>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    let new_user = user_data.into_new_user()?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    current_user(&claims, &connection)?;

    let user = create_user(new_user, OffsetDateTime::now_utc(), &connection)?;
    tracing::info!("User {} created user {}", claims.sub, user.id);

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// A route handler for listing all users. Admins only.
///
/// # Errors
///
/// Returns [Error::Forbidden] if the caller is not an admin.
pub async fn list_users_endpoint(
    State(state): State<UserState>,
    claims: Claims,
) -> Result<Json<Vec<UserResponse>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_admin(&current_user(&claims, &connection)?)?;

    let users = list_users(&connection)?;

    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

/// A route handler for getting a single user.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist or belongs to
/// someone else.
pub async fn get_user_endpoint(
    State(state): State<UserState>,
    claims: Claims,
    Path(user_id): Path<i64>,
) -> Result<Json<UserResponse>, Error> {
    let user_id = UserID::new(user_id);
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_can_access(&current_user(&claims, &connection)?, user_id)?;

    let user = get_user_by_id(user_id, &connection)?;

    Ok(Json(UserResponse::from(&user)))
}

/// A route handler for overwriting some of a user's game state.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist or belongs to
/// someone else, or [Error::InvalidField] if the update is invalid.
pub async fn update_user_endpoint(
    State(state): State<UserState>,
    claims: Claims,
    Path(user_id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>, Error> {
    let user_id = UserID::new(user_id);
    let mut connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_can_access(&current_user(&claims, &connection)?, user_id)?;

    let user = update_user(user_id, update, OffsetDateTime::now_utc(), &mut connection)?;

    Ok(Json(UserResponse::from(&user)))
}

/// A route handler for soft deleting a user. Admins only.
///
/// # Errors
///
/// Returns [Error::Forbidden] if the caller is not an admin, or
/// [Error::DeleteMissingUser] if the user does not exist.
pub async fn delete_user_endpoint(
    State(state): State<UserState>,
    claims: Claims,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, Error> {
    let user_id = UserID::new(user_id);
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_admin(&current_user(&claims, &connection)?)?;

    soft_delete_user(user_id, OffsetDateTime::now_utc(), &connection)?;
    tracing::info!("User {} deleted user {user_id}", claims.sub);

    Ok(Json(json!({ "message": "User deleted successfully" })))
}

/// A route handler for awarding experience to a user.
///
/// # Errors
///
/// Returns [Error::InvalidArgument] for a negative amount, or
/// [Error::NotFound] if the user does not exist or belongs to someone else.
pub async fn award_experience_endpoint(
    State(state): State<UserState>,
    claims: Claims,
    Path(user_id): Path<i64>,
    Json(data): Json<ExperienceData>,
) -> Result<Json<UserResponse>, Error> {
    let user_id = UserID::new(user_id);
    let gained = ExperienceGain::new(data.experience)?;
    let mut connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_can_access(&current_user(&claims, &connection)?, user_id)?;

    let user = award_experience(user_id, gained, OffsetDateTime::now_utc(), &mut connection)?;

    Ok(Json(UserResponse::from(&user)))
}

/// A route handler for recording activity towards a user's daily streak.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist or belongs to
/// someone else.
pub async fn record_activity_endpoint(
    State(state): State<UserState>,
    claims: Claims,
    Path(user_id): Path<i64>,
) -> Result<Json<UserResponse>, Error> {
    let user_id = UserID::new(user_id);
    let mut connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_can_access(&current_user(&claims, &connection)?, user_id)?;

    let user = record_activity(user_id, OffsetDateTime::now_utc(), &mut connection)?;

    Ok(Json(UserResponse::from(&user)))
}

/// A route handler for unlocking an achievement.
///
/// # Errors
///
/// Returns [Error::InvalidField] for an empty achievement name, or
/// [Error::NotFound] if the user does not exist or belongs to someone else.
pub async fn add_achievement_endpoint(
    State(state): State<UserState>,
    claims: Claims,
    Path(user_id): Path<i64>,
    Json(data): Json<AchievementData>,
) -> Result<Json<UserResponse>, Error> {
    let user_id = UserID::new(user_id);
    let achievement = data.achievement.trim();
    if achievement.is_empty() {
        return Err(Error::InvalidField(
            "achievement must not be empty".to_owned(),
        ));
    }

    let mut connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_can_access(&current_user(&claims, &connection)?, user_id)?;

    let user = add_achievement(
        user_id,
        achievement,
        OffsetDateTime::now_utc(),
        &mut connection,
    )?;

    Ok(Json(UserResponse::from(&user)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use crate::{
        endpoints::{self, format_endpoint},
        progression::MAX_STREAK,
        test_utils::{TestApp, insert_admin},
        user::{Role, UserResponse, UserUpdate, get_user_by_id, update_user},
    };

    #[tokio::test]
    async fn get_own_user_succeeds() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        let response = app
            .server
            .get(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .await;

        response.assert_status_ok();
        let got = response.json::<UserResponse>();
        assert_eq!(got.id, user.id);
        assert_eq!(got.username, "player123");
        assert_eq!(got.progress.level, 1);
        assert_eq!(got.progress.max_experience, 100.0);
    }

    #[tokio::test]
    async fn response_never_contains_password() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        let response = app
            .server
            .get(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .await;

        let body = response.json::<serde_json::Value>();
        assert!(body.get("password").is_none());
        assert!(body.get("password_hash").is_none());
        assert_eq!(body["role"], "user");
        assert_eq!(body["streak"], 0);
    }

    #[tokio::test]
    async fn get_other_user_is_not_found() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let other_user = app.insert_user("player456");

        app.server
            .get(&format_endpoint(endpoints::USER, other_user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn admin_can_get_other_user() {
        let app = TestApp::new();
        let admin = insert_admin(&app);
        let other_user = app.insert_user("player456");

        app.server
            .get(&format_endpoint(endpoints::USER, other_user.id.as_i64()))
            .authorization_bearer(app.token_for(&admin))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn get_user_without_token_is_unauthorized() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .get(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_of_deleted_user_is_rejected() {
        let app = TestApp::new();
        let admin = insert_admin(&app);
        let user = app.insert_user("player123");
        let token = app.token_for(&user);

        app.server
            .delete(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(app.token_for(&admin))
            .await
            .assert_status_ok();

        app.server
            .get(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_user_succeeds() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        let response = app
            .server
            .post(endpoints::USERS)
            .authorization_bearer(app.token_for(&user))
            .json(&json!({
                "username": "newplayer",
                "email": "new@example.com",
                "first_name": "Jane",
                "last_name": "Doe",
                "password": "Secur3P@ss",
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let got = response.json::<UserResponse>();
        assert_eq!(got.username, "newplayer");
        assert_eq!(got.role, Role::User);
    }

    #[tokio::test]
    async fn create_duplicate_user_is_conflict() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .post(endpoints::USERS)
            .authorization_bearer(app.token_for(&user))
            .json(&json!({
                "username": "newplayer",
                "email": user.email,
                "first_name": "Jane",
                "last_name": "Doe",
                "password": "Secur3P@ss",
            }))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_user_with_weak_password_is_bad_request() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .post(endpoints::USERS)
            .authorization_bearer(app.token_for(&user))
            .json(&json!({
                "username": "newplayer",
                "email": "new@example.com",
                "first_name": "Jane",
                "last_name": "Doe",
                "password": "password",
            }))
            .await
            .assert_status_bad_request();
    }

    #[tokio::test]
    async fn list_users_requires_admin() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .get(endpoints::USERS)
            .authorization_bearer(app.token_for(&user))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_lists_all_users() {
        let app = TestApp::new();
        let admin = insert_admin(&app);
        let user = app.insert_user("player123");

        let response = app
            .server
            .get(endpoints::USERS)
            .authorization_bearer(app.token_for(&admin))
            .await;

        response.assert_status_ok();
        let ids: Vec<_> = response
            .json::<Vec<UserResponse>>()
            .iter()
            .map(|user| user.id)
            .collect();
        assert_eq!(ids, vec![admin.id, user.id]);
    }

    #[tokio::test]
    async fn patch_user_updates_fields() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        let response = app
            .server
            .patch(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .json(&json!({ "coins": 120, "achievements": ["saver"] }))
            .await;

        response.assert_status_ok();
        let got = response.json::<UserResponse>();
        assert_eq!(got.progress.coins, 120.0);
        assert_eq!(got.achievements, vec!["saver".to_owned()]);
    }

    #[tokio::test]
    async fn patch_user_rejects_invalid_values() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        let response = app
            .server
            .patch(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .json(&json!({ "max_experience": 1 }))
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({ "error": "max_experience must be at least 2" }));
    }

    #[tokio::test]
    async fn patch_user_rejects_out_of_range_counters() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let path = format_endpoint(endpoints::USER, user.id.as_i64());
        let token = app.token_for(&user);

        let response = app
            .server
            .patch(&path)
            .authorization_bearer(token.clone())
            .json(&json!({
                "streak": u32::MAX,
                "last_activity_date": "2020-01-01T00:00:00Z",
            }))
            .await;
        response.assert_status_bad_request();
        response.assert_json(&json!({ "error": format!("streak must be at most {MAX_STREAK}") }));

        app.server
            .patch(&path)
            .authorization_bearer(token.clone())
            .json(&json!({ "level": u32::MAX }))
            .await
            .assert_status_bad_request();

        let response = app
            .server
            .post(&format_endpoint(endpoints::USER_STREAK, user.id.as_i64()))
            .authorization_bearer(token)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<UserResponse>().progress.streak, 1);
    }

    #[tokio::test]
    async fn streak_at_cap_stays_at_cap() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let token = app.token_for(&user);

        app.server
            .patch(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(token.clone())
            .json(&json!({
                "streak": MAX_STREAK,
                "last_activity_date": "2020-01-01T00:00:00Z",
            }))
            .await
            .assert_status_ok();

        let response = app
            .server
            .post(&format_endpoint(endpoints::USER_STREAK, user.id.as_i64()))
            .authorization_bearer(token.clone())
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<UserResponse>().progress.streak, MAX_STREAK);

        app.server
            .get(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(token)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn delete_user_requires_admin() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .delete(&format_endpoint(endpoints::USER, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_deletes_user() {
        let app = TestApp::new();
        let admin = insert_admin(&app);
        let user = app.insert_user("player123");
        let path = format_endpoint(endpoints::USER, user.id.as_i64());

        let response = app
            .server
            .delete(&path)
            .authorization_bearer(app.token_for(&admin))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "message": "User deleted successfully" }));

        app.server
            .delete(&path)
            .authorization_bearer(app.token_for(&admin))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn award_experience_levels_up() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        let response = app
            .server
            .post(&format_endpoint(endpoints::USER_EXPERIENCE, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .json(&json!({ "experience": 130 }))
            .await;

        response.assert_status_ok();
        let got = response.json::<UserResponse>();
        assert_eq!(got.progress.level, 2);
        assert_eq!(got.progress.experience, 30.0);
        assert_eq!(got.progress.max_experience, 150.0);
        assert_eq!(got.progress.max_health, 110.0);
        assert_eq!(got.progress.health, 110.0);
    }

    #[tokio::test]
    async fn award_negative_experience_is_bad_request() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .post(&format_endpoint(endpoints::USER_EXPERIENCE, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .json(&json!({ "experience": -5 }))
            .await
            .assert_status_bad_request();

        let connection = app.state.db_connection.lock().unwrap();
        assert_eq!(get_user_by_id(user.id, &connection).unwrap(), user);
    }

    #[tokio::test]
    async fn record_activity_after_a_day_extends_streak() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        {
            let mut connection = app.state.db_connection.lock().unwrap();
            let update = UserUpdate {
                streak: Some(6),
                last_activity_date: Some(OffsetDateTime::now_utc() - Duration::days(2)),
                ..Default::default()
            };
            update_user(user.id, update, OffsetDateTime::now_utc(), &mut connection).unwrap();
        }

        let response = app
            .server
            .post(&format_endpoint(endpoints::USER_STREAK, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .await;

        response.assert_status_ok();
        let got = response.json::<UserResponse>();
        assert_eq!(got.progress.streak, 7);
        assert_eq!(got.progress.coins, 5.0);
    }

    #[tokio::test]
    async fn record_activity_twice_keeps_streak() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let path = format_endpoint(endpoints::USER_STREAK, user.id.as_i64());
        let token = app.token_for(&user);

        app.server
            .post(&path)
            .authorization_bearer(token.clone())
            .await
            .assert_status_ok();
        let response = app.server.post(&path).authorization_bearer(token).await;

        response.assert_status_ok();
        let got = response.json::<UserResponse>();
        assert_eq!(got.progress.streak, 1);
        assert_eq!(got.progress.coins, 0.0);
    }

    #[tokio::test]
    async fn add_achievement_is_idempotent() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let path = format_endpoint(endpoints::USER_ACHIEVEMENTS, user.id.as_i64());
        let token = app.token_for(&user);

        for _ in 0..2 {
            app.server
                .post(&path)
                .authorization_bearer(token.clone())
                .json(&json!({ "achievement": "first_login" }))
                .await
                .assert_status_ok();
        }

        let connection = app.state.db_connection.lock().unwrap();
        assert_eq!(
            get_user_by_id(user.id, &connection).unwrap().achievements,
            vec!["first_login".to_owned()]
        );
    }

    #[tokio::test]
    async fn add_empty_achievement_is_bad_request() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .post(&format_endpoint(endpoints::USER_ACHIEVEMENTS, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .json(&json!({ "achievement": "  " }))
            .await
            .assert_status_bad_request();
    }
}
