//! The JSON endpoints for recording, listing, editing and deleting
//! transactions.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    auth::{Claims, current_user, ensure_can_access},
    database_id::TransactionId,
    transaction::{
        NewTransaction, Transaction, TransactionUpdate, create_transaction, delete_transaction,
        get_transaction, get_transactions_by_user, update_transaction,
    },
    user::{UserID, get_user_by_id},
};

/// The state needed to manage transactions.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for recording a new transaction.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user does not exist or is someone else,
/// or a validation error for a bad amount or category.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    claims: Claims,
    Json(new_transaction): Json<NewTransaction>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    new_transaction.validate()?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_can_access(
        &current_user(&claims, &connection)?,
        new_transaction.user_id,
    )?;
    get_user_by_id(new_transaction.user_id, &connection)?;

    let transaction = create_transaction(new_transaction, OffsetDateTime::now_utc(), &connection)?;
    tracing::debug!(
        "User {} recorded transaction {} for user {}",
        claims.sub,
        transaction.id,
        transaction.user_id
    );

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for listing a user's transactions, newest first.
///
/// # Errors
///
/// Returns [Error::NotFound] if the user belongs to someone else.
pub async fn list_transactions_endpoint(
    State(state): State<TransactionState>,
    claims: Claims,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let user_id = UserID::new(user_id);
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    ensure_can_access(&current_user(&claims, &connection)?, user_id)?;

    get_transactions_by_user(user_id, &connection).map(Json)
}

/// A route handler for editing a transaction.
///
/// # Errors
///
/// Returns [Error::UpdateMissingTransaction] if the transaction does not
/// exist, [Error::NotFound] if it belongs to someone else, or a validation
/// error for a bad amount or category.
pub async fn update_transaction_endpoint(
    State(state): State<TransactionState>,
    claims: Claims,
    Path(transaction_id): Path<TransactionId>,
    Json(update): Json<TransactionUpdate>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let actor = current_user(&claims, &connection)?;

    let owner = match get_transaction(transaction_id, &connection) {
        Ok(transaction) => transaction.user_id,
        Err(Error::NotFound) => return Err(Error::UpdateMissingTransaction),
        Err(error) => return Err(error),
    };
    ensure_can_access(&actor, owner)?;

    update_transaction(
        transaction_id,
        update,
        OffsetDateTime::now_utc(),
        &connection,
    )
    .map(Json)
}

/// A route handler for deleting a transaction. Responds with the deleted
/// transaction.
///
/// # Errors
///
/// Returns [Error::DeleteMissingTransaction] if the transaction does not
/// exist, or [Error::NotFound] if it belongs to someone else.
pub async fn delete_transaction_endpoint(
    State(state): State<TransactionState>,
    claims: Claims,
    Path(transaction_id): Path<TransactionId>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;
    let actor = current_user(&claims, &connection)?;

    let owner = match get_transaction(transaction_id, &connection) {
        Ok(transaction) => transaction.user_id,
        Err(Error::NotFound) => return Err(Error::DeleteMissingTransaction),
        Err(error) => return Err(error),
    };
    ensure_can_access(&actor, owner)?;

    let transaction = delete_transaction(transaction_id, &connection)?;
    tracing::debug!("User {} deleted transaction {transaction_id}", claims.sub);

    Ok(Json(transaction))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{
        endpoints::{self, format_endpoint},
        test_utils::{TestApp, insert_admin},
        transaction::{Transaction, TransactionCategory, TransactionType},
        user::User,
    };

    fn expense_body(user: &User, date: &str) -> Value {
        json!({
            "user_id": user.id,
            "amount": 23.5,
            "type": "expense",
            "category": "food",
            "description": "lunch",
            "date": date,
        })
    }

    async fn create_expense(app: &TestApp, user: &User, date: &str) -> Transaction {
        let response = app
            .server
            .post(endpoints::EXPENSES)
            .authorization_bearer(app.token_for(user))
            .json(&expense_body(user, date))
            .await;

        response.assert_status(StatusCode::CREATED);
        response.json::<Transaction>()
    }

    #[tokio::test]
    async fn create_transaction_succeeds() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        let transaction = create_expense(&app, &user, "2025-06-02T12:30:00Z").await;

        assert_eq!(transaction.user_id, user.id);
        assert_eq!(transaction.amount, 23.5);
        assert_eq!(transaction.transaction_type, TransactionType::Expense);
        assert_eq!(transaction.category, TransactionCategory::Food);
        assert_eq!(transaction.description.as_deref(), Some("lunch"));
        assert_eq!(transaction.points_earned, 0.0);
        assert!(transaction.tags.is_empty());
    }

    #[tokio::test]
    async fn create_transaction_with_mismatched_category_is_bad_request() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let mut body = expense_body(&user, "2025-06-02T12:30:00Z");
        body["category"] = json!("salary");

        let response = app
            .server
            .post(endpoints::EXPENSES)
            .authorization_bearer(app.token_for(&user))
            .json(&body)
            .await;

        response.assert_status_bad_request();
        response.assert_json(
            &json!({ "error": "the category salary cannot be used for expense transactions" }),
        );
    }

    #[tokio::test]
    async fn create_transaction_for_other_user_is_not_found() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let other_user = app.insert_user("player456");

        app.server
            .post(endpoints::EXPENSES)
            .authorization_bearer(app.token_for(&user))
            .json(&expense_body(&other_user, "2025-06-02T12:30:00Z"))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn list_transactions_is_newest_first() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let older = create_expense(&app, &user, "2025-06-01T08:00:00Z").await;
        let newer = create_expense(&app, &user, "2025-06-03T08:00:00Z").await;

        let response = app
            .server
            .get(&format_endpoint(endpoints::EXPENSE, user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Vec<Transaction>>(), vec![newer, older]);
    }

    #[tokio::test]
    async fn list_other_users_transactions_is_not_found() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let other_user = app.insert_user("player456");

        app.server
            .get(&format_endpoint(endpoints::EXPENSE, other_user.id.as_i64()))
            .authorization_bearer(app.token_for(&user))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn update_transaction_succeeds() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let transaction = create_expense(&app, &user, "2025-06-02T12:30:00Z").await;

        let response = app
            .server
            .put(&format_endpoint(endpoints::EXPENSE, transaction.id))
            .authorization_bearer(app.token_for(&user))
            .json(&json!({ "amount": 30, "category": "entertainment" }))
            .await;

        response.assert_status_ok();
        let updated = response.json::<Transaction>();
        assert_eq!(updated.id, transaction.id);
        assert_eq!(updated.amount, 30.0);
        assert_eq!(updated.category, TransactionCategory::Entertainment);
        assert_eq!(updated.description, transaction.description);
    }

    #[tokio::test]
    async fn update_missing_transaction_is_not_found() {
        let app = TestApp::new();
        let user = app.insert_user("player123");

        app.server
            .put(&format_endpoint(endpoints::EXPENSE, 1337))
            .authorization_bearer(app.token_for(&user))
            .json(&json!({ "amount": 30 }))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn admin_can_update_other_users_transaction() {
        let app = TestApp::new();
        let admin = insert_admin(&app);
        let user = app.insert_user("player123");
        let transaction = create_expense(&app, &user, "2025-06-02T12:30:00Z").await;

        app.server
            .put(&format_endpoint(endpoints::EXPENSE, transaction.id))
            .authorization_bearer(app.token_for(&admin))
            .json(&json!({ "description": "team lunch" }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn delete_transaction_returns_deleted() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let transaction = create_expense(&app, &user, "2025-06-02T12:30:00Z").await;
        let path = format_endpoint(endpoints::EXPENSE, transaction.id);

        let response = app
            .server
            .delete(&path)
            .authorization_bearer(app.token_for(&user))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Transaction>(), transaction);

        app.server
            .delete(&path)
            .authorization_bearer(app.token_for(&user))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn delete_other_users_transaction_is_not_found() {
        let app = TestApp::new();
        let user = app.insert_user("player123");
        let other_user = app.insert_user("player456");
        let transaction = create_expense(&app, &other_user, "2025-06-02T12:30:00Z").await;

        app.server
            .delete(&format_endpoint(endpoints::EXPENSE, transaction.id))
            .authorization_bearer(app.token_for(&user))
            .await
            .assert_status_not_found();
    }
}
