//! Creates the application's database schema.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::{Error, transaction::create_transaction_table, user::create_user_table};

/// Create the tables for all the domain models.
///
/// Foreign keys are switched on for `connection`. Running this on an
/// existing database is a no-op.
///
/// # Errors
/// Returns an error if any of the tables cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
