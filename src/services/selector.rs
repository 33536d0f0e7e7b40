//! Due-transaction selection: the read-only scan that feeds the dispatcher.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::EngineError;
use crate::store::{DueTransaction, LedgerStore};

pub struct DueTransactionSelector {
    store: Arc<dyn LedgerStore>,
}

impl DueTransactionSelector {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Recurring transactions that have never been processed or whose next
    /// due date has arrived. No side effects; due-ness is state, so items
    /// that fail downstream are simply picked up again on the next pass.
    pub async fn select_due(&self, today: NaiveDate) -> Result<Vec<DueTransaction>, EngineError> {
        self.store.due_recurring_transactions(today).await
    }
}
