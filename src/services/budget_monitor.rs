//! Periodic budget sweep: compares each owner's current-month expenses on
//! their default account against the configured ceiling and sends at most
//! one alert per owner per calendar month.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::models::Budget;
use crate::services::notifier::{Notifier, TemplateKind};
use crate::store::LedgerStore;
use crate::utils::date::month_bounds;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub alerts_sent: usize,
}

pub struct BudgetAlertMonitor {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl BudgetAlertMonitor {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn run_sweep(&self) -> Result<SweepSummary, EngineError> {
        let budgets = self.store.list_budgets().await?;
        let mut summary = SweepSummary::default();
        for budget in budgets {
            summary.checked += 1;
            match self.check_budget(&budget).await {
                Ok(true) => summary.alerts_sent += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(user_id = %budget.user_id, error = %e, "budget check failed");
                }
            }
        }
        info!(
            checked = summary.checked,
            alerts = summary.alerts_sent,
            "budget sweep finished"
        );
        Ok(summary)
    }

    /// Returns true when an alert was dispatched for this budget.
    async fn check_budget(&self, budget: &Budget) -> Result<bool, EngineError> {
        if budget.amount <= Decimal::ZERO {
            return Ok(false);
        }
        let Some(account) = self.store.find_default_account(budget.user_id).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        let (month_start, month_end) = month_bounds(now.date_naive());
        let expenses = self
            .store
            .sum_expenses(account.id, month_start, month_end)
            .await?;
        let percentage_used = expenses / budget.amount * Decimal::from(100);

        if percentage_used < Decimal::from(80) {
            return Ok(false);
        }
        // One alert per calendar month, no matter how often the sweep runs
        // or how far over threshold expenses climb.
        if let Some(last) = budget.last_alert_sent {
            if !is_new_month(last, now) {
                return Ok(false);
            }
        }

        let Some(user) = self.store.find_user(budget.user_id).await? else {
            warn!(user_id = %budget.user_id, "budget owner missing from user directory");
            return Ok(false);
        };

        let payload = json!({
            "user_name": user.first_name,
            "account_name": account.name,
            "percentage_used": percentage_used.round_dp(1),
            "budget_amount": budget.amount,
            "total_expenses": expenses,
        });
        if let Err(e) = self
            .notifier
            .send(&user.email, TemplateKind::BudgetAlert, payload)
            .await
        {
            // Delivery is advisory; the month marker still advances.
            error!(user_id = %budget.user_id, error = %e, "failed to send budget alert");
        }
        self.store.set_budget_alert_sent(budget.user_id, now).await?;
        Ok(true)
    }
}

fn is_new_month(last_alert: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    last_alert.month() != now.month() || last_alert.year() != now.year()
}
