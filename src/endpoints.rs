//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/users/{user_id}', use [format_endpoint].

/// The route for checking that the server is up.
pub const HEALTH: &str = "/api/health";
/// The route for registering a new user.
pub const REGISTER: &str = "/api/auth/register";
/// The route for logging in a user.
pub const LOG_IN: &str = "/api/auth/login";
/// The route to access users.
pub const USERS: &str = "/api/users";
/// The route to access a single user.
pub const USER: &str = "/api/users/{user_id}";
/// The route to award experience to a user.
pub const USER_EXPERIENCE: &str = "/api/users/{user_id}/experience";
/// The route to record activity for a user's streak.
pub const USER_STREAK: &str = "/api/users/{user_id}/streak";
/// The route to unlock an achievement for a user.
pub const USER_ACHIEVEMENTS: &str = "/api/users/{user_id}/achievements";
/// The route to create transactions.
pub const EXPENSES: &str = "/api/expenses";
/// The route to list a user's transactions (GET, the ID is a user ID), or
/// update and delete a single transaction (PUT and DELETE, the ID is a
/// transaction ID).
pub const EXPENSE: &str = "/api/expenses/{id}";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_owned();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|end| param_start + end + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
