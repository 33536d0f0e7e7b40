//! In-memory ledger store. Backs the test suite and local experimentation;
//! all mutations happen under one mutex, so every multi-step operation is
//! atomic by construction. Failure injection knobs let tests observe the
//! rollback behavior the Postgres backend gets from ACID transactions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Account, AccountId, Budget, Transaction, TransactionId, User, UserId};
use crate::services::recurrence::next_occurrence;

use super::{
    validate_new_transaction, DueTransaction, LedgerStore, Materialization, MaterializeOutcome,
    NewAccount, NewTransaction, TransactionUpdate,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
    budgets: HashMap<UserId, Budget>,
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
    // Simulates a crash between the balance update and the schedule advance.
    // Nothing is committed, mirroring a rolled-back store transaction.
    fail_after_balance_update: AtomicBool,
    // Next N apply_materialization calls fail with a transient error.
    transient_apply_failures: AtomicU32,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_after_balance_update(&self, fail: bool) {
        self.fail_after_balance_update.store(fail, Ordering::SeqCst);
    }

    pub fn set_transient_apply_failures(&self, count: u32) {
        self.transient_apply_failures.store(count, Ordering::SeqCst);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_account(&self, account: Account) {
        self.state.lock().await.accounts.insert(account.id, account);
    }

    pub async fn insert_transaction(&self, transaction: Transaction) {
        self.state
            .lock()
            .await
            .transactions
            .insert(transaction.id, transaction);
    }

    pub async fn insert_budget(&self, budget: Budget) {
        self.state.lock().await.budgets.insert(budget.user_id, budget);
    }

    /// Count of stored transactions, handy for idempotence assertions.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, EngineError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, EngineError> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, EngineError> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&new.user_id) {
            return Err(EngineError::NotFound("user"));
        }

        let has_accounts = state.accounts.values().any(|a| a.user_id == new.user_id);
        // The first account is always the default.
        let is_default = !has_accounts || new.is_default;
        if is_default {
            for account in state.accounts.values_mut() {
                if account.user_id == new.user_id {
                    account.is_default = false;
                }
            }
        }

        let account = Account {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            name: new.name,
            balance: new.balance,
            is_default,
            created_at: Utc::now(),
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, EngineError> {
        let state = self.state.lock().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    async fn find_account(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Option<Account>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .get(&account_id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn find_default_account(&self, user_id: UserId) -> Result<Option<Account>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.user_id == user_id && a.is_default)
            .cloned())
    }

    async fn set_default_account(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Account, EngineError> {
        let mut state = self.state.lock().await;
        if !state
            .accounts
            .get(&account_id)
            .is_some_and(|a| a.user_id == user_id)
        {
            return Err(EngineError::NotFound("account"));
        }
        for account in state.accounts.values_mut() {
            if account.user_id == user_id {
                account.is_default = account.id == account_id;
            }
        }
        Ok(state.accounts[&account_id].clone())
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, EngineError> {
        validate_new_transaction(&new)?;
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&new.account_id)
            .filter(|a| a.user_id == new.user_id)
            .ok_or(EngineError::NotFound("account"))?;

        account.balance += new.kind.signed(new.amount);

        let next_due_date = new
            .recurring_interval
            .map(|interval| next_occurrence(new.date, interval));
        let transaction = Transaction {
            id: Uuid::new_v4(),
            account_id: new.account_id,
            user_id: new.user_id,
            kind: new.kind,
            amount: new.amount,
            date: new.date,
            category: new.category,
            description: new.description,
            is_recurring: new.is_recurring,
            recurring_interval: new.recurring_interval,
            last_processed: None,
            next_due_date,
            created_at: Utc::now(),
        };
        state.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
    ) -> Result<Option<Transaction>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .get(&transaction_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn list_transactions(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, EngineError> {
        let state = self.state.lock().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.account_id == account_id && t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transactions)
    }

    async fn update_transaction(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
        update: TransactionUpdate,
    ) -> Result<Transaction, EngineError> {
        let mut state = self.state.lock().await;
        let current = state
            .transactions
            .get(&transaction_id)
            .filter(|t| t.user_id == user_id)
            .cloned()
            .ok_or(EngineError::NotFound("transaction"))?;

        let kind = update.kind.unwrap_or(current.kind);
        let amount = update.amount.unwrap_or(current.amount);
        let date = update.date.unwrap_or(current.date);
        let category = update.category.unwrap_or_else(|| current.category.clone());
        let description = update
            .description
            .unwrap_or_else(|| current.description.clone());
        let is_recurring = update.is_recurring.unwrap_or(current.is_recurring);
        let recurring_interval = if is_recurring {
            update
                .recurring_interval
                .unwrap_or(current.recurring_interval)
        } else {
            None
        };

        if amount < Decimal::ZERO {
            return Err(EngineError::Validation(
                "transaction amount must be non-negative".to_string(),
            ));
        }
        if is_recurring && recurring_interval.is_none() {
            return Err(EngineError::Validation(
                "recurring transaction requires an interval".to_string(),
            ));
        }

        // Net balance effect of the edit, applied in the same atomic step.
        let delta = kind.signed(amount) - current.kind.signed(current.amount);
        let account = state
            .accounts
            .get_mut(&current.account_id)
            .ok_or(EngineError::NotFound("account"))?;
        account.balance += delta;

        let next_due_date =
            recurring_interval.map(|interval| next_occurrence(date, interval));
        let updated = Transaction {
            kind,
            amount,
            date,
            category,
            description,
            is_recurring,
            recurring_interval,
            next_due_date,
            ..current
        };
        state.transactions.insert(transaction_id, updated.clone());
        Ok(updated)
    }

    async fn delete_transactions(
        &self,
        transaction_ids: &[TransactionId],
        user_id: UserId,
    ) -> Result<u64, EngineError> {
        let mut state = self.state.lock().await;
        let mut reversals: HashMap<AccountId, Decimal> = HashMap::new();
        let mut removed = 0u64;

        for id in transaction_ids {
            let Some(transaction) = state
                .transactions
                .get(id)
                .filter(|t| t.user_id == user_id)
                .cloned()
            else {
                continue;
            };
            *reversals.entry(transaction.account_id).or_default() -=
                transaction.kind.signed(transaction.amount);
            state.transactions.remove(id);
            removed += 1;
        }

        for (account_id, delta) in reversals {
            if let Some(account) = state.accounts.get_mut(&account_id) {
                account.balance += delta;
            }
        }
        Ok(removed)
    }

    async fn transactions_in_range(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id && t.date >= from && t.date <= to)
            .cloned()
            .collect())
    }

    async fn due_recurring_transactions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<DueTransaction>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .filter(|t| t.is_due(today))
            .map(|t| DueTransaction {
                transaction_id: t.id,
                user_id: t.user_id,
            })
            .collect())
    }

    async fn find_recurring_with_account(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
    ) -> Result<Option<(Transaction, Account)>, EngineError> {
        let state = self.state.lock().await;
        let Some(transaction) = state
            .transactions
            .get(&transaction_id)
            .filter(|t| t.user_id == user_id && t.is_recurring)
            .cloned()
        else {
            return Ok(None);
        };
        let Some(account) = state
            .accounts
            .get(&transaction.account_id)
            .filter(|a| a.user_id == user_id)
            .cloned()
        else {
            return Ok(None);
        };
        Ok(Some((transaction, account)))
    }

    async fn apply_materialization(
        &self,
        materialization: Materialization,
    ) -> Result<MaterializeOutcome, EngineError> {
        if self.transient_apply_failures.load(Ordering::SeqCst) > 0 {
            self.transient_apply_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::Unavailable(
                "injected transient failure".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let Some(source) = state
            .transactions
            .get(&materialization.source_id)
            .filter(|t| t.user_id == materialization.user_id)
            .cloned()
        else {
            return Ok(MaterializeOutcome::Missing);
        };
        // Re-check under the lock: a concurrent worker may have advanced the
        // schedule between the caller's read and this call.
        if !source.is_due(materialization.processed_at.date_naive()) {
            return Ok(MaterializeOutcome::NotDue);
        }

        let mut account = state
            .accounts
            .get(&source.account_id)
            .filter(|a| a.user_id == materialization.user_id)
            .cloned()
            .ok_or(EngineError::NotFound("account"))?;

        // Stage all three sub-steps on clones; commit only if every one
        // succeeds, so a mid-flight failure leaves the store untouched.
        account.balance += materialization.balance_delta;
        if self.fail_after_balance_update.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable(
                "injected failure after balance update".to_string(),
            ));
        }

        let derived = &materialization.derived;
        let derived_row = Transaction {
            id: Uuid::new_v4(),
            account_id: derived.account_id,
            user_id: derived.user_id,
            kind: derived.kind,
            amount: derived.amount,
            date: derived.date,
            category: derived.category.clone(),
            description: derived.description.clone(),
            is_recurring: false,
            recurring_interval: None,
            last_processed: None,
            next_due_date: None,
            created_at: materialization.processed_at,
        };

        let mut advanced = source;
        advanced.last_processed = Some(materialization.processed_at);
        advanced.next_due_date = Some(materialization.next_due_date);

        state.transactions.insert(derived_row.id, derived_row);
        state.accounts.insert(account.id, account);
        state.transactions.insert(advanced.id, advanced);
        Ok(MaterializeOutcome::Applied)
    }

    async fn upsert_budget(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Budget, EngineError> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(EngineError::NotFound("user"));
        }
        let now = Utc::now();
        let budget = state
            .budgets
            .entry(user_id)
            .and_modify(|b| {
                b.amount = amount;
                b.updated_at = now;
            })
            .or_insert(Budget {
                user_id,
                amount,
                last_alert_sent: None,
                updated_at: now,
            });
        Ok(budget.clone())
    }

    async fn find_budget(&self, user_id: UserId) -> Result<Option<Budget>, EngineError> {
        Ok(self.state.lock().await.budgets.get(&user_id).cloned())
    }

    async fn list_budgets(&self) -> Result<Vec<Budget>, EngineError> {
        Ok(self.state.lock().await.budgets.values().cloned().collect())
    }

    async fn sum_expenses(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .filter(|t| {
                t.account_id == account_id
                    && t.kind == crate::models::TransactionKind::Expense
                    && t.date >= from
                    && t.date <= to
            })
            .map(|t| t.amount)
            .sum())
    }

    async fn set_budget_alert_sent(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let budget = state
            .budgets
            .get_mut(&user_id)
            .ok_or(EngineError::NotFound("budget"))?;
        budget.last_alert_sent = Some(at);
        Ok(())
    }
}
