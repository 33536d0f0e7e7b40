//! Domain types: accounts, transactions, budgets, the user directory record,
//! and ID aliases. Money is rust_decimal; dates are chrono.

pub mod account;
pub mod budget;
pub mod ids;
pub mod transaction;
pub mod user;

pub use account::Account;
pub use budget::Budget;
pub use ids::{AccountId, TransactionId, UserId};
pub use transaction::{RecurringInterval, Transaction, TransactionKind};
pub use user::User;
