//! Application router configuration.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    AppState, Error,
    auth::{post_log_in, register_user},
    endpoints,
    health::get_health,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, list_transactions_endpoint,
        update_transaction_endpoint,
    },
    user::{
        add_achievement_endpoint, award_experience_endpoint, create_user_endpoint,
        delete_user_endpoint, get_user_endpoint, list_users_endpoint, record_activity_endpoint,
        update_user_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// Routes that need a logged in user extract [crate::auth::Claims], which
/// rejects requests without a valid bearer token.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::REGISTER, post(register_user))
        .route(endpoints::LOG_IN, post(post_log_in));

    let user_routes = Router::new()
        .route(
            endpoints::USERS,
            get(list_users_endpoint).post(create_user_endpoint),
        )
        .route(
            endpoints::USER,
            get(get_user_endpoint)
                .patch(update_user_endpoint)
                .delete(delete_user_endpoint),
        )
        .route(endpoints::USER_EXPERIENCE, post(award_experience_endpoint))
        .route(endpoints::USER_STREAK, post(record_activity_endpoint))
        .route(endpoints::USER_ACHIEVEMENTS, post(add_achievement_endpoint));

    let transaction_routes = Router::new()
        .route(endpoints::EXPENSES, post(create_transaction_endpoint))
        .route(
            endpoints::EXPENSE,
            get(list_transactions_endpoint)
                .put(update_transaction_endpoint)
                .delete(delete_transaction_endpoint),
        );

    unprotected_routes
        .merge(user_routes)
        .merge(transaction_routes)
        .fallback(get_404_not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_404_not_found() -> Error {
    Error::NotFound
}
