// Test helpers: fixtures over the in-memory store and a recording notifier.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use finance_tracker_api::error::EngineError;
use finance_tracker_api::models::{
    Account, RecurringInterval, Transaction, TransactionKind, User,
};
use finance_tracker_api::services::notifier::{Notifier, TemplateKind};
use finance_tracker_api::store::MemoryLedgerStore;

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("valid decimal literal")
}

pub async fn create_test_user(store: &MemoryLedgerStore) -> Uuid {
    let user_id = Uuid::new_v4();
    store
        .insert_user(User {
            id: user_id,
            email: format!("{user_id}@example.com"),
            first_name: "Test".to_string(),
        })
        .await;
    user_id
}

pub async fn create_test_account(
    store: &MemoryLedgerStore,
    user_id: Uuid,
    balance: &str,
    is_default: bool,
) -> Uuid {
    let account_id = Uuid::new_v4();
    store
        .insert_account(Account {
            id: account_id,
            user_id,
            name: "Checking".to_string(),
            balance: dec(balance),
            is_default,
            created_at: Utc::now(),
        })
        .await;
    account_id
}

/// A recurring transaction template that has never been processed.
pub fn recurring_transaction(
    user_id: Uuid,
    account_id: Uuid,
    kind: TransactionKind,
    amount: &str,
    interval: RecurringInterval,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        account_id,
        user_id,
        kind,
        amount: dec(amount),
        date: Utc::now().date_naive(),
        category: "bills".to_string(),
        description: Some("Gym membership".to_string()),
        is_recurring: true,
        recurring_interval: Some(interval),
        last_processed: None,
        next_due_date: None,
        created_at: Utc::now(),
    }
}

pub fn one_off_transaction(
    user_id: Uuid,
    account_id: Uuid,
    kind: TransactionKind,
    amount: &str,
    date: chrono::NaiveDate,
    category: &str,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        account_id,
        user_id,
        kind,
        amount: dec(amount),
        date,
        category: category.to_string(),
        description: None,
        is_recurring: false,
        recurring_interval: None,
        last_processed: None,
        next_due_date: None,
        created_at: Utc::now(),
    }
}

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, TemplateKind, Value)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<(String, TemplateKind, Value)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: &str,
        kind: TemplateKind,
        payload: Value,
    ) -> Result<(), EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable(
                "injected notifier failure".to_string(),
            ));
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), kind, payload));
        Ok(())
    }
}
