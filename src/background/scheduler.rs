//! Periodic triggers: the daily select-and-dispatch cycle for recurring
//! transactions, the six-hourly budget sweep, and the monthly report run.
//! The triggers are independent of each other; each job logs its own
//! failures and the next firing starts from current store state.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::Config;
use crate::services::dispatcher::{BatchDispatcher, RetryPolicy};
use crate::services::insights::InsightsClient;
use crate::services::materializer::TransactionMaterializer;
use crate::services::notifier::Notifier;
use crate::services::selector::DueTransactionSelector;
use crate::services::{BudgetAlertMonitor, MonthlyReportJob};
use crate::store::LedgerStore;

const RECURRING_DISPATCH_SCHEDULE: &str = "0 0 0 * * *";
const BUDGET_SWEEP_SCHEDULE: &str = "0 0 */6 * * *";
const MONTHLY_REPORT_SCHEDULE: &str = "0 0 0 1 * *";

pub struct BackgroundScheduler {
    #[allow(dead_code)]
    scheduler: Arc<JobScheduler>,
}

impl BackgroundScheduler {
    pub async fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;

        {
            let store = store.clone();
            scheduler
                .add(Job::new_async(RECURRING_DISPATCH_SCHEDULE, move |_uuid, _l| {
                    let store = store.clone();
                    Box::pin(async move {
                        run_recurring_cycle(store).await;
                    })
                })?)
                .await?;
        }

        {
            let store = store.clone();
            let notifier = notifier.clone();
            scheduler
                .add(Job::new_async(BUDGET_SWEEP_SCHEDULE, move |_uuid, _l| {
                    let store = store.clone();
                    let notifier = notifier.clone();
                    Box::pin(async move {
                        run_budget_sweep(store, notifier).await;
                    })
                })?)
                .await?;
        }

        {
            scheduler
                .add(Job::new_async(MONTHLY_REPORT_SCHEDULE, move |_uuid, _l| {
                    let store = store.clone();
                    let notifier = notifier.clone();
                    let config = config.clone();
                    Box::pin(async move {
                        run_monthly_reports(store, notifier, config).await;
                    })
                })?)
                .await?;
        }

        scheduler.start().await?;
        info!("Background scheduler started");

        Ok(Self {
            scheduler: Arc::new(scheduler),
        })
    }

    pub async fn shutdown(&self) {
        // JobScheduler shuts down when dropped
        info!("Background scheduler stopped");
    }
}

/// One select-and-dispatch cycle: scan for due recurring transactions, then
/// fan them out as independently retryable units.
pub async fn run_recurring_cycle(store: Arc<dyn LedgerStore>) {
    let selector = DueTransactionSelector::new(store.clone());
    let due = match selector.select_due(Utc::now().date_naive()).await {
        Ok(due) => due,
        Err(e) => {
            error!(error = %e, "due-transaction scan failed");
            return;
        }
    };
    if due.is_empty() {
        info!("No recurring transactions due");
        return;
    }

    info!(count = due.len(), "Dispatching due recurring transactions");
    let materializer = Arc::new(TransactionMaterializer::new(store));
    let dispatcher = BatchDispatcher::new(materializer, RetryPolicy::default());
    let summary = dispatcher.dispatch(due).await;
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        "Recurring cycle finished"
    );
}

pub async fn run_budget_sweep(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) {
    let monitor = BudgetAlertMonitor::new(store, notifier);
    if let Err(e) = monitor.run_sweep().await {
        error!(error = %e, "budget sweep failed");
    }
}

pub async fn run_monthly_reports(
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
) {
    let insights = InsightsClient::new(
        config.insights_url.clone(),
        config.insights_api_key.clone(),
    );
    let job = MonthlyReportJob::new(store, notifier, insights);
    if let Err(e) = job.run().await {
        error!(error = %e, "monthly report run failed");
    }
}
