//! Monthly financial reports: aggregate last month's activity per user and
//! email a summary with best-effort insights.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::EngineError;
use crate::models::{Transaction, TransactionKind, User};
use crate::services::insights::InsightsClient;
use crate::services::notifier::{Notifier, TemplateKind};
use crate::store::LedgerStore;
use crate::utils::date::previous_month_bounds;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MonthlyStats {
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub by_category: BTreeMap<String, Decimal>,
    pub transaction_count: usize,
}

impl MonthlyStats {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut stats = Self {
            transaction_count: transactions.len(),
            ..Self::default()
        };
        for transaction in transactions {
            match transaction.kind {
                TransactionKind::Income => stats.total_income += transaction.amount,
                TransactionKind::Expense => {
                    stats.total_expenses += transaction.amount;
                    *stats
                        .by_category
                        .entry(transaction.category.clone())
                        .or_default() += transaction.amount;
                }
            }
        }
        stats
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub sent: usize,
    pub failed: usize,
}

pub struct MonthlyReportJob {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    insights: InsightsClient,
}

impl MonthlyReportJob {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        insights: InsightsClient,
    ) -> Self {
        Self {
            store,
            notifier,
            insights,
        }
    }

    pub async fn run(&self) -> Result<ReportSummary, EngineError> {
        let users = self.store.list_users().await?;
        let mut summary = ReportSummary::default();
        for user in users {
            match self.send_report(&user).await {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    // One user's failure never aborts the sweep.
                    error!(user_id = %user.id, error = %e, "monthly report failed");
                    summary.failed += 1;
                }
            }
        }
        info!(sent = summary.sent, failed = summary.failed, "monthly report run finished");
        Ok(summary)
    }

    async fn send_report(&self, user: &User) -> Result<(), EngineError> {
        let today = Utc::now().date_naive();
        let (month_start, month_end) = previous_month_bounds(today);
        let transactions = self
            .store
            .transactions_in_range(user.id, month_start, month_end)
            .await?;

        let stats = MonthlyStats::from_transactions(&transactions);
        let month_name = month_start.format("%B %Y").to_string();
        let insights = self.insights.monthly_insights(&stats, &month_name).await;

        self.notifier
            .send(
                &user.email,
                TemplateKind::MonthlyReport,
                json!({
                    "user_name": user.first_name,
                    "month": month_name,
                    "stats": stats,
                    "insights": insights,
                }),
            )
            .await
    }
}
