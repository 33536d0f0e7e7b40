// Monthly report flow: stats aggregation, the insights fallback, and
// per-user delivery.

mod test_helpers;

use std::sync::Arc;

use chrono::Utc;

use finance_tracker_api::models::TransactionKind;
use finance_tracker_api::services::insights::{fallback_insights, InsightsClient};
use finance_tracker_api::services::notifier::TemplateKind;
use finance_tracker_api::services::reports::MonthlyStats;
use finance_tracker_api::services::MonthlyReportJob;
use finance_tracker_api::store::MemoryLedgerStore;
use finance_tracker_api::utils::date::previous_month_bounds;

use test_helpers::{
    create_test_account, create_test_user, dec, one_off_transaction, RecordingNotifier,
};

#[test]
fn stats_aggregate_income_expenses_and_categories() {
    let user_id = uuid::Uuid::new_v4();
    let account_id = uuid::Uuid::new_v4();
    let today = Utc::now().date_naive();

    let transactions = vec![
        one_off_transaction(user_id, account_id, TransactionKind::Income, "2500.00", today, "salary"),
        one_off_transaction(user_id, account_id, TransactionKind::Expense, "800.00", today, "rent"),
        one_off_transaction(user_id, account_id, TransactionKind::Expense, "120.50", today, "groceries"),
        one_off_transaction(user_id, account_id, TransactionKind::Expense, "79.50", today, "groceries"),
    ];

    let stats = MonthlyStats::from_transactions(&transactions);
    assert_eq!(stats.transaction_count, 4);
    assert_eq!(stats.total_income, dec("2500.00"));
    assert_eq!(stats.total_expenses, dec("1000.00"));
    assert_eq!(stats.by_category.get("rent"), Some(&dec("800.00")));
    assert_eq!(stats.by_category.get("groceries"), Some(&dec("200.00")));
    assert!(stats.by_category.get("salary").is_none());
}

#[tokio::test]
async fn unconfigured_insights_provider_degrades_to_the_fallback_set() {
    let client = InsightsClient::new(None, None);
    let insights = client
        .monthly_insights(&MonthlyStats::default(), "January 2026")
        .await;
    assert_eq!(insights, fallback_insights());
    assert_eq!(insights.len(), 3);
}

#[tokio::test]
async fn report_job_emails_every_user_with_last_months_numbers() {
    let store = Arc::new(MemoryLedgerStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let user_id = create_test_user(&store).await;
    let account_id = create_test_account(&store, user_id, "500.00", true).await;

    let (last_month_start, _) = previous_month_bounds(Utc::now().date_naive());
    store
        .insert_transaction(one_off_transaction(
            user_id,
            account_id,
            TransactionKind::Expense,
            "321.00",
            last_month_start,
            "rent",
        ))
        .await;
    // This month's activity must not leak into last month's report.
    store
        .insert_transaction(one_off_transaction(
            user_id,
            account_id,
            TransactionKind::Expense,
            "999.00",
            Utc::now().date_naive(),
            "rent",
        ))
        .await;

    let job = MonthlyReportJob::new(
        store.clone(),
        notifier.clone(),
        InsightsClient::new(None, None),
    );
    let summary = job.run().await.expect("report run");
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 0);

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, TemplateKind::MonthlyReport);

    let payload = &sent[0].2;
    let total_expenses: rust_decimal::Decimal = payload["stats"]["total_expenses"]
        .as_str()
        .expect("expenses in payload")
        .parse()
        .expect("decimal expenses");
    assert_eq!(total_expenses, dec("321.00"));
    assert_eq!(
        payload["insights"].as_array().map(|a| a.len()),
        Some(fallback_insights().len())
    );
}

#[tokio::test]
async fn one_failing_recipient_does_not_abort_the_run() {
    let store = Arc::new(MemoryLedgerStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    notifier.set_fail(true);
    create_test_user(&store).await;
    create_test_user(&store).await;

    let job = MonthlyReportJob::new(
        store.clone(),
        notifier.clone(),
        InsightsClient::new(None, None),
    );
    let summary = job.run().await.expect("report run");
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.failed, 2);
}
