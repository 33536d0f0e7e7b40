//! Ledger store abstraction. Components receive an explicitly constructed
//! `Arc<dyn LedgerStore>` handle instead of reaching for process-wide state,
//! which keeps the scheduling engine testable against the in-memory backend.
//!
//! Every operation that moves money is atomic inside the store: the balance
//! adjustment commits in the same transaction as the ledger write that caused
//! it, or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::{
    Account, AccountId, Budget, RecurringInterval, Transaction, TransactionId, TransactionKind,
    User, UserId,
};

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub user_id: UserId,
    pub name: String,
    pub balance: Decimal,
    pub is_default: bool,
}

#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub is_recurring: bool,
    pub recurring_interval: Option<RecurringInterval>,
}

/// Partial update for an existing transaction; `None` keeps the current value.
#[derive(Clone, Debug, Default)]
pub struct TransactionUpdate {
    pub kind: Option<TransactionKind>,
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub description: Option<Option<String>>,
    pub is_recurring: Option<bool>,
    pub recurring_interval: Option<Option<RecurringInterval>>,
}

/// A recurring transaction eligible for materialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueTransaction {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
}

/// The three-part atomic update of one materialization: insert the derived
/// entry, shift the account balance, advance the source schedule.
#[derive(Clone, Debug)]
pub struct Materialization {
    pub source_id: TransactionId,
    pub user_id: UserId,
    pub derived: NewTransaction,
    pub balance_delta: Decimal,
    pub processed_at: DateTime<Utc>,
    pub next_due_date: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// All three sub-steps committed.
    Applied,
    /// Another execution already advanced the schedule past now.
    NotDue,
    /// Source transaction or account missing under the given owner.
    Missing,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // User directory (read-only).
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, EngineError>;
    async fn list_users(&self) -> Result<Vec<User>, EngineError>;

    // Accounts.
    async fn create_account(&self, new: NewAccount) -> Result<Account, EngineError>;
    async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, EngineError>;
    async fn find_account(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Option<Account>, EngineError>;
    async fn find_default_account(&self, user_id: UserId) -> Result<Option<Account>, EngineError>;
    /// Mark `account_id` as the owner's default, clearing any prior default
    /// in the same atomic step.
    async fn set_default_account(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Account, EngineError>;

    // Transactions.
    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, EngineError>;
    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
    ) -> Result<Option<Transaction>, EngineError>;
    async fn list_transactions(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, EngineError>;
    async fn update_transaction(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
        update: TransactionUpdate,
    ) -> Result<Transaction, EngineError>;
    /// Delete transactions and restore the affected account balances in one
    /// atomic step. Returns the number of rows deleted.
    async fn delete_transactions(
        &self,
        transaction_ids: &[TransactionId],
        user_id: UserId,
    ) -> Result<u64, EngineError>;
    async fn transactions_in_range(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>, EngineError>;

    // Recurring engine.
    async fn due_recurring_transactions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<DueTransaction>, EngineError>;
    async fn find_recurring_with_account(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
    ) -> Result<Option<(Transaction, Account)>, EngineError>;
    /// Apply one materialization as a single transactional unit. The due
    /// re-check runs again under the row lock, so concurrent deliveries of
    /// the same transaction collapse to one `Applied` and the rest `NotDue`.
    async fn apply_materialization(
        &self,
        materialization: Materialization,
    ) -> Result<MaterializeOutcome, EngineError>;

    // Budgets.
    async fn upsert_budget(&self, user_id: UserId, amount: Decimal)
        -> Result<Budget, EngineError>;
    async fn find_budget(&self, user_id: UserId) -> Result<Option<Budget>, EngineError>;
    async fn list_budgets(&self) -> Result<Vec<Budget>, EngineError>;
    async fn sum_expenses(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, EngineError>;
    async fn set_budget_alert_sent(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError>;
}

/// Shared validation for incoming transactions, used by both backends.
pub(crate) fn validate_new_transaction(new: &NewTransaction) -> Result<(), EngineError> {
    if new.amount < Decimal::ZERO {
        return Err(EngineError::Validation(
            "transaction amount must be non-negative".to_string(),
        ));
    }
    if new.is_recurring && new.recurring_interval.is_none() {
        return Err(EngineError::Validation(
            "recurring transaction requires an interval".to_string(),
        ));
    }
    if !new.is_recurring && new.recurring_interval.is_some() {
        return Err(EngineError::Validation(
            "non-recurring transaction must not carry an interval".to_string(),
        ));
    }
    Ok(())
}
