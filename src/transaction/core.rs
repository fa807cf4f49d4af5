//! Defines the core data models and database queries for transactions.

use std::fmt::Display;

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use crate::{Error, database_id::TransactionId, user::UserID};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money came in or went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money earned.
    Income,
    /// Money spent.
    Expense,
}

impl TransactionType {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// What a transaction was for. Each category belongs to exactly one
/// [TransactionType].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCategory {
    /// Groceries and eating out.
    Food,
    /// Public transport, fuel and fares.
    Transport,
    /// Rent or mortgage.
    Housing,
    /// Power, water and internet.
    Utilities,
    /// Hobbies and going out.
    Entertainment,
    /// Medical costs.
    Health,
    /// Courses and books.
    Education,
    /// Everything else that was bought.
    Shopping,
    /// Any other expense.
    OtherExpense,
    /// Wages.
    Salary,
    /// Contract work.
    Freelance,
    /// Dividends and interest.
    Investment,
    /// Money received as a gift.
    Gift,
    /// Any other income.
    OtherIncome,
}

impl TransactionCategory {
    /// Every category, expenses first.
    pub const ALL: [TransactionCategory; 14] = [
        TransactionCategory::Food,
        TransactionCategory::Transport,
        TransactionCategory::Housing,
        TransactionCategory::Utilities,
        TransactionCategory::Entertainment,
        TransactionCategory::Health,
        TransactionCategory::Education,
        TransactionCategory::Shopping,
        TransactionCategory::OtherExpense,
        TransactionCategory::Salary,
        TransactionCategory::Freelance,
        TransactionCategory::Investment,
        TransactionCategory::Gift,
        TransactionCategory::OtherIncome,
    ];

    /// The transaction type this category may be used with.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionCategory::Salary
            | TransactionCategory::Freelance
            | TransactionCategory::Investment
            | TransactionCategory::Gift
            | TransactionCategory::OtherIncome => TransactionType::Income,
            _ => TransactionType::Expense,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::Food => "food",
            TransactionCategory::Transport => "transport",
            TransactionCategory::Housing => "housing",
            TransactionCategory::Utilities => "utilities",
            TransactionCategory::Entertainment => "entertainment",
            TransactionCategory::Health => "health",
            TransactionCategory::Education => "education",
            TransactionCategory::Shopping => "shopping",
            TransactionCategory::OtherExpense => "other_expense",
            TransactionCategory::Salary => "salary",
            TransactionCategory::Freelance => "freelance",
            TransactionCategory::Investment => "investment",
            TransactionCategory::Gift => "gift",
            TransactionCategory::OtherIncome => "other_income",
        }
    }
}

impl Display for TransactionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        TransactionCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == text)
            .ok_or(FromSqlError::InvalidType)
    }
}

/// Check that `category` may be used with `transaction_type`.
///
/// # Errors
///
/// Returns [Error::CategoryTypeMismatch] if it may not.
fn check_category(
    category: TransactionCategory,
    transaction_type: TransactionType,
) -> Result<(), Error> {
    if category.transaction_type() == transaction_type {
        Ok(())
    } else {
        Err(Error::CategoryTypeMismatch {
            category,
            transaction_type,
        })
    }
}

fn check_amount(amount: f64) -> Result<(), Error> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidField(
            "amount must be a number greater than 0".to_owned(),
        ))
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user who recorded the transaction.
    pub user_id: UserID,
    /// The amount of money spent or earned, always positive.
    pub amount: f64,
    /// Whether the money was spent or earned.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// What the money was for.
    pub category: TransactionCategory,
    /// A text description of what the transaction was for.
    pub description: Option<String>,
    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Points awarded for recording the transaction.
    pub points_earned: f64,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// When the transaction was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the transaction last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The data for recording a new transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// The user the transaction belongs to.
    pub user_id: UserID,
    /// Greater than zero.
    pub amount: f64,
    /// Whether the money was spent or earned.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Must belong to `transaction_type`.
    pub category: TransactionCategory,
    /// Optional text description.
    #[serde(default)]
    pub description: Option<String>,
    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

impl NewTransaction {
    /// Check the amount and that the category matches the type.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidField] for an amount that is not positive, or
    /// [Error::CategoryTypeMismatch].
    pub fn validate(&self) -> Result<(), Error> {
        check_amount(self.amount)?;
        check_category(self.category, self.transaction_type)
    }
}

/// The fields of a transaction that may be changed. Missing fields are left
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionUpdate {
    /// Greater than zero.
    pub amount: Option<f64>,
    /// The new type, the resulting category must belong to it.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    /// The new category, must belong to the resulting type.
    pub category: Option<TransactionCategory>,
    /// The new description.
    pub description: Option<String>,
}

impl TransactionUpdate {
    /// Apply the update to `transaction`, returning the updated transaction.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidField] for an amount that is not positive, or
    /// [Error::CategoryTypeMismatch] if the resulting category and type do
    /// not match.
    pub fn apply(self, mut transaction: Transaction) -> Result<Transaction, Error> {
        if let Some(amount) = self.amount {
            check_amount(amount)?;
            transaction.amount = amount;
        }

        if let Some(transaction_type) = self.transaction_type {
            transaction.transaction_type = transaction_type;
        }

        if let Some(category) = self.category {
            transaction.category = category;
        }

        if let Some(description) = self.description {
            transaction.description = Some(description);
        }

        check_category(transaction.category, transaction.transaction_type)?;

        Ok(transaction)
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, user_id, amount, type, category, description, date, \
    points_earned, tags, created_at, updated_at";

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                type TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT,
                date TEXT NOT NULL,
                points_earned REAL NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
///
/// The row must contain the columns in the order of `TRANSACTION_COLUMNS`.
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let raw_tags: String = row.get(8)?;
    let tags = serde_json::from_str(&raw_tags)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, error.into()))?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        amount: row.get(2)?,
        transaction_type: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        date: row.get(6)?,
        points_earned: row.get(7)?,
        tags,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Create a new transaction in the database.
///
/// The caller is expected to have validated `new_transaction`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the user does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = now.to_offset(UtcOffset::UTC);

    connection
        .prepare(&format!(
            "INSERT INTO \"transaction\"
                (user_id, amount, type, category, description, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                new_transaction.user_id.as_i64(),
                new_transaction.amount,
                new_transaction.transaction_type,
                new_transaction.category,
                new_transaction.description,
                new_transaction.date.to_offset(UtcOffset::UTC),
                now,
                now,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = :id"
        ))?
        .query_row(&[(":id", &id)], map_transaction_row)?;

    Ok(transaction)
}

/// Get the transactions of `user_id`, newest first.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn get_transactions_by_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE user_id = :user_id
             ORDER BY date DESC, id DESC"
        ))?
        .query_map(&[(":user_id", &user_id.as_i64())], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Apply `update` to the transaction `id` and save it.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if `id` does not refer to a valid transaction,
/// - [Error::InvalidField] or [Error::CategoryTypeMismatch] if the update is invalid,
/// - or [Error::SqlError] there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    update: TransactionUpdate,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = match get_transaction(id, connection) {
        Ok(transaction) => transaction,
        Err(Error::NotFound) => return Err(Error::UpdateMissingTransaction),
        Err(error) => return Err(error),
    };
    let transaction = update.apply(transaction)?;

    connection
        .prepare(&format!(
            "UPDATE \"transaction\"
             SET amount = ?1, type = ?2, category = ?3, description = ?4, updated_at = ?5
             WHERE id = ?6
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                transaction.amount,
                transaction.transaction_type,
                transaction.category,
                transaction.description,
                now.to_offset(UtcOffset::UTC),
                id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingTransaction,
            error => error.into(),
        })
}

/// Delete the transaction `id` and return it.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingTransaction] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn delete_transaction(
    id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "DELETE FROM \"transaction\" WHERE id = :id RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(&[(":id", &id)], map_transaction_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::DeleteMissingTransaction,
            error => error.into(),
        })
}

// ============================================================================
// TESTS
// ============================================================================
