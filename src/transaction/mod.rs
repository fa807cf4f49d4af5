//! Income and expense transactions.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model with its type and category enums
//! - Database functions for storing, querying, and managing transactions
//! - The JSON endpoints under `/api/expenses`

mod core;
mod endpoints;

pub use core::{
    NewTransaction, Transaction, TransactionCategory, TransactionType, TransactionUpdate,
    create_transaction, create_transaction_table, delete_transaction, get_transaction,
    get_transactions_by_user, update_transaction,
};
pub use endpoints::{
    create_transaction_endpoint, delete_transaction_endpoint, list_transactions_endpoint,
    update_transaction_endpoint,
};
