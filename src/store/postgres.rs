//! Postgres-backed ledger store. Multi-step money operations run inside one
//! database transaction with `FOR UPDATE` row locks on the account and source
//! transaction, so concurrent materializations of the same transaction
//! serialize while different transactions proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    Account, AccountId, Budget, RecurringInterval, Transaction, TransactionId, TransactionKind,
    User, UserId,
};
use crate::services::recurrence::next_occurrence;

use super::{
    validate_new_transaction, DueTransaction, LedgerStore, Materialization, MaterializeOutcome,
    NewAccount, NewTransaction, TransactionUpdate,
};

const TRANSACTION_COLUMNS: &str = "id, account_id, user_id, kind, amount, date, category, \
     description, is_recurring, recurring_interval, last_processed, next_due_date, created_at";

const ACCOUNT_COLUMNS: &str = "id, user_id, name, balance, is_default, created_at";

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Classify sqlx failures: lock waits and connectivity problems are
/// transient and retryable, everything else is terminal.
fn store_err(e: sqlx::Error) -> EngineError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("55P03") => {
            EngineError::LockTimeout
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => EngineError::Unavailable(e.to_string()),
        _ => EngineError::Internal(e.into()),
    }
}

fn decode_err(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            balance: row.try_get("balance")?,
            is_default: row.try_get("is_default")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for Transaction {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let kind = TransactionKind::from_str(&kind)
            .ok_or_else(|| decode_err("kind", format!("unknown transaction kind: {kind}")))?;
        let interval: Option<String> = row.try_get("recurring_interval")?;
        let recurring_interval = match interval {
            Some(raw) => Some(RecurringInterval::from_str(&raw).ok_or_else(|| {
                decode_err(
                    "recurring_interval",
                    format!("unknown recurring interval: {raw}"),
                )
            })?),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            user_id: row.try_get("user_id")?,
            kind,
            amount: row.try_get("amount")?,
            date: row.try_get("date")?,
            category: row.try_get("category")?,
            description: row.try_get("description")?,
            is_recurring: row.try_get("is_recurring")?,
            recurring_interval,
            last_processed: row.try_get("last_processed")?,
            next_due_date: row.try_get("next_due_date")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for Budget {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            amount: row.try_get("amount")?,
            last_alert_sent: row.try_get("last_alert_sent")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
        })
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, EngineError> {
        sqlx::query_as::<_, User>("SELECT id, email, first_name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn list_users(&self) -> Result<Vec<User>, EngineError> {
        sqlx::query_as::<_, User>("SELECT id, email, first_name FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account, EngineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE user_id = $1")
                .bind(new.user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(store_err)?;

        // The first account is always the default; setting a new default
        // clears the previous one in the same transaction.
        let is_default = existing == 0 || new.is_default;
        if is_default {
            sqlx::query("UPDATE accounts SET is_default = FALSE WHERE user_id = $1 AND is_default")
                .bind(new.user_id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        let account = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO accounts (id, user_id, name, balance, is_default) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.name)
        .bind(new.balance)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(account)
    }

    async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, EngineError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn find_account(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Option<Account>, EngineError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND user_id = $2"
        ))
        .bind(account_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn find_default_account(&self, user_id: UserId) -> Result<Option<Account>, EngineError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 AND is_default"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn set_default_account(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Account, EngineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1 AND user_id = $2)",
        )
        .bind(account_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;
        if !exists {
            return Err(EngineError::NotFound("account"));
        }

        sqlx::query("UPDATE accounts SET is_default = FALSE WHERE user_id = $1 AND is_default")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        let account = sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET is_default = TRUE WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(account)
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, EngineError> {
        validate_new_transaction(&new)?;
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let locked_account: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM accounts WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(new.account_id)
        .bind(new.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;
        if locked_account.is_none() {
            return Err(EngineError::NotFound("account"));
        }

        let next_due_date = new
            .recurring_interval
            .map(|interval| next_occurrence(new.date, interval));

        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions \
             (id, account_id, user_id, kind, amount, date, category, description, \
              is_recurring, recurring_interval, next_due_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.account_id)
        .bind(new.user_id)
        .bind(new.kind.as_str())
        .bind(new.amount)
        .bind(new.date)
        .bind(&new.category)
        .bind(&new.description)
        .bind(new.is_recurring)
        .bind(new.recurring_interval.map(|i| i.as_str()))
        .bind(next_due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
            .bind(new.kind.signed(new.amount))
            .bind(new.account_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(transaction)
    }

    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
    ) -> Result<Option<Transaction>, EngineError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 AND user_id = $2"
        ))
        .bind(transaction_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn list_transactions(
        &self,
        account_id: AccountId,
        user_id: UserId,
    ) -> Result<Vec<Transaction>, EngineError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE account_id = $1 AND user_id = $2 ORDER BY created_at DESC"
        ))
        .bind(account_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn update_transaction(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
        update: TransactionUpdate,
    ) -> Result<Transaction, EngineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let current = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(transaction_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?
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

        let delta = kind.signed(amount) - current.kind.signed(current.amount);
        if delta != Decimal::ZERO {
            sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
                .bind(delta)
                .bind(current.account_id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        let next_due_date = recurring_interval.map(|interval| next_occurrence(date, interval));
        let updated = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions \
             SET kind = $1, amount = $2, date = $3, category = $4, description = $5, \
                 is_recurring = $6, recurring_interval = $7, next_due_date = $8 \
             WHERE id = $9 \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(kind.as_str())
        .bind(amount)
        .bind(date)
        .bind(&category)
        .bind(&description)
        .bind(is_recurring)
        .bind(recurring_interval.map(|i| i.as_str()))
        .bind(next_due_date)
        .bind(transaction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(updated)
    }

    async fn delete_transactions(
        &self,
        transaction_ids: &[TransactionId],
        user_id: UserId,
    ) -> Result<u64, EngineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let doomed = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE id = ANY($1) AND user_id = $2 FOR UPDATE"
        ))
        .bind(transaction_ids)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_err)?;

        if doomed.is_empty() {
            return Ok(0);
        }

        // Per-account reversal of the balance effects, applied in the same
        // transaction as the deletes.
        let mut reversals: std::collections::HashMap<AccountId, Decimal> =
            std::collections::HashMap::new();
        for transaction in &doomed {
            *reversals.entry(transaction.account_id).or_default() -=
                transaction.kind.signed(transaction.amount);
        }

        let ids: Vec<Uuid> = doomed.iter().map(|t| t.id).collect();
        let deleted = sqlx::query("DELETE FROM transactions WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?
            .rows_affected();

        for (account_id, delta) in reversals {
            sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
                .bind(delta)
                .bind(account_id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(deleted)
    }

    async fn transactions_in_range(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>, EngineError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE user_id = $1 AND date BETWEEN $2 AND $3"
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn due_recurring_transactions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<DueTransaction>, EngineError> {
        // Full scan of the recurring population; this is a periodic batch
        // query, not a hot path.
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT id, user_id FROM transactions \
             WHERE is_recurring AND (last_processed IS NULL OR next_due_date <= $1)",
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|(transaction_id, user_id)| DueTransaction {
                transaction_id,
                user_id,
            })
            .collect())
    }

    async fn find_recurring_with_account(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
    ) -> Result<Option<(Transaction, Account)>, EngineError> {
        let Some(transaction) = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE id = $1 AND user_id = $2 AND is_recurring"
        ))
        .bind(transaction_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?
        else {
            return Ok(None);
        };

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND user_id = $2"
        ))
        .bind(transaction.account_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(account.map(|account| (transaction, account)))
    }

    async fn apply_materialization(
        &self,
        materialization: Materialization,
    ) -> Result<MaterializeOutcome, EngineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Bound the wait on row locks; a timeout surfaces as transient and
        // the dispatcher retries with backoff.
        sqlx::query("SET LOCAL lock_timeout = '5s'")
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        let Some(source) = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE id = $1 AND user_id = $2 AND is_recurring FOR UPDATE"
        ))
        .bind(materialization.source_id)
        .bind(materialization.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?
        else {
            return Ok(MaterializeOutcome::Missing);
        };

        // Re-check due-ness on the locked row: concurrent deliveries of the
        // same transaction collapse to a single application.
        if !source.is_due(materialization.processed_at.date_naive()) {
            return Ok(MaterializeOutcome::NotDue);
        }

        let locked_account: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM accounts WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(source.account_id)
        .bind(materialization.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;
        if locked_account.is_none() {
            return Ok(MaterializeOutcome::Missing);
        }

        let derived = &materialization.derived;
        sqlx::query(
            "INSERT INTO transactions \
             (id, account_id, user_id, kind, amount, date, category, description, is_recurring) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)",
        )
        .bind(Uuid::new_v4())
        .bind(derived.account_id)
        .bind(derived.user_id)
        .bind(derived.kind.as_str())
        .bind(derived.amount)
        .bind(derived.date)
        .bind(&derived.category)
        .bind(&derived.description)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
            .bind(materialization.balance_delta)
            .bind(source.account_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query(
            "UPDATE transactions SET last_processed = $1, next_due_date = $2 WHERE id = $3",
        )
        .bind(materialization.processed_at)
        .bind(materialization.next_due_date)
        .bind(materialization.source_id)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(MaterializeOutcome::Applied)
    }

    async fn upsert_budget(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Budget, EngineError> {
        sqlx::query_as::<_, Budget>(
            "INSERT INTO budgets (user_id, amount, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET amount = EXCLUDED.amount, updated_at = NOW() \
             RETURNING user_id, amount, last_alert_sent, updated_at",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn find_budget(&self, user_id: UserId) -> Result<Option<Budget>, EngineError> {
        sqlx::query_as::<_, Budget>(
            "SELECT user_id, amount, last_alert_sent, updated_at FROM budgets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn list_budgets(&self) -> Result<Vec<Budget>, EngineError> {
        sqlx::query_as::<_, Budget>(
            "SELECT user_id, amount, last_alert_sent, updated_at FROM budgets",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn sum_expenses(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, EngineError> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions \
             WHERE account_id = $1 AND kind = 'EXPENSE' AND date BETWEEN $2 AND $3",
        )
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn set_budget_alert_sent(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let result = sqlx::query("UPDATE budgets SET last_alert_sent = $1 WHERE user_id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("budget"));
        }
        Ok(())
    }
}
