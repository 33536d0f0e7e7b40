//! Turns a due recurring transaction into a concrete ledger entry.
//!
//! The operation is idempotent: the due re-check (here on the loaded
//! snapshot, and again inside the store under the row lock) means a
//! re-delivered event for an already-processed transaction is a silent
//! no-op, with no duplicate entry and no double balance adjustment.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::{TransactionId, UserId};
use crate::services::recurrence::next_occurrence;
use crate::store::{LedgerStore, Materialization, MaterializeOutcome, NewTransaction};

pub struct TransactionMaterializer {
    store: Arc<dyn LedgerStore>,
}

impl TransactionMaterializer {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn materialize(
        &self,
        transaction_id: TransactionId,
        user_id: UserId,
    ) -> Result<MaterializeOutcome, EngineError> {
        let Some((source, account)) = self
            .store
            .find_recurring_with_account(transaction_id, user_id)
            .await?
        else {
            // Missing under this owner: treat as already handled or
            // unauthorized; the batch continues.
            warn!(%transaction_id, %user_id, "recurring transaction or account missing, skipping");
            return Ok(MaterializeOutcome::Missing);
        };

        let now = Utc::now();
        let today = now.date_naive();
        if !source.is_due(today) {
            return Ok(MaterializeOutcome::NotDue);
        }

        let interval = source.recurring_interval.ok_or_else(|| {
            EngineError::Validation(format!(
                "recurring transaction {transaction_id} has no interval"
            ))
        })?;

        let description = match &source.description {
            Some(text) => format!("{text} (recurring)"),
            None => format!("{} (recurring)", source.category),
        };
        let derived = NewTransaction {
            account_id: source.account_id,
            user_id: source.user_id,
            kind: source.kind,
            amount: source.amount,
            date: today,
            category: source.category.clone(),
            description: Some(description),
            is_recurring: false,
            recurring_interval: None,
        };

        let outcome = self
            .store
            .apply_materialization(Materialization {
                source_id: source.id,
                user_id,
                derived,
                balance_delta: source.kind.signed(source.amount),
                processed_at: now,
                next_due_date: next_occurrence(today, interval),
            })
            .await?;

        match outcome {
            MaterializeOutcome::Applied => {
                info!(
                    %transaction_id,
                    account = %account.name,
                    amount = %source.amount,
                    kind = %source.kind,
                    "materialized recurring transaction"
                );
            }
            MaterializeOutcome::NotDue => {
                info!(%transaction_id, "schedule already advanced by a concurrent worker");
            }
            MaterializeOutcome::Missing => {
                warn!(%transaction_id, "source disappeared mid-materialization");
            }
        }
        Ok(outcome)
    }
}
