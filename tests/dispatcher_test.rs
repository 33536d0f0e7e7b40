// Dispatcher behavior: bounded retry with backoff, per-item independence,
// and the per-owner throttle window.

mod test_helpers;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use finance_tracker_api::models::{RecurringInterval, TransactionKind};
use finance_tracker_api::services::dispatcher::OwnerThrottle;
use finance_tracker_api::services::{BatchDispatcher, RetryPolicy, TransactionMaterializer};
use finance_tracker_api::store::{DueTransaction, LedgerStore, MemoryLedgerStore};

use test_helpers::{create_test_account, create_test_user, dec, recurring_transaction};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let store = Arc::new(MemoryLedgerStore::new());
    let user_id = create_test_user(&store).await;
    let account_id = create_test_account(&store, user_id, "1000.00", true).await;

    let source = recurring_transaction(
        user_id,
        account_id,
        TransactionKind::Expense,
        "50.00",
        RecurringInterval::Monthly,
    );
    let source_id = source.id;
    store.insert_transaction(source).await;

    // First two applies fail transiently; the third attempt lands.
    store.set_transient_apply_failures(2);

    let materializer = Arc::new(TransactionMaterializer::new(store.clone()));
    let dispatcher = BatchDispatcher::new(materializer, fast_retry());
    let summary = dispatcher
        .dispatch(vec![DueTransaction {
            transaction_id: source_id,
            user_id,
        }])
        .await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    let account = store
        .find_account(account_id, user_id)
        .await
        .expect("store read")
        .expect("account exists");
    assert_eq!(account.balance, dec("950.00"));
}

#[tokio::test]
async fn exhausted_retries_leave_the_item_due_for_the_next_cycle() {
    let store = Arc::new(MemoryLedgerStore::new());
    let user_id = create_test_user(&store).await;
    let account_id = create_test_account(&store, user_id, "1000.00", true).await;

    let source = recurring_transaction(
        user_id,
        account_id,
        TransactionKind::Expense,
        "50.00",
        RecurringInterval::Monthly,
    );
    let source_id = source.id;
    store.insert_transaction(source).await;

    // More failures than the policy allows attempts (1 initial + 2 retries).
    store.set_transient_apply_failures(5);

    let materializer = Arc::new(TransactionMaterializer::new(store.clone()));
    let dispatcher = BatchDispatcher::new(materializer, fast_retry());
    let summary = dispatcher
        .dispatch(vec![DueTransaction {
            transaction_id: source_id,
            user_id,
        }])
        .await;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 1);

    // Due-ness is state, not a one-shot event: the item is re-selected later.
    let due = store
        .due_recurring_transactions(Utc::now().date_naive())
        .await
        .expect("store read");
    assert_eq!(due.len(), 1);
    let account = store
        .find_account(account_id, user_id)
        .await
        .expect("store read")
        .expect("account exists");
    assert_eq!(account.balance, dec("1000.00"));
}

#[tokio::test]
async fn one_bad_item_does_not_block_the_rest_of_the_batch() {
    let store = Arc::new(MemoryLedgerStore::new());
    let user_id = create_test_user(&store).await;
    let account_id = create_test_account(&store, user_id, "1000.00", true).await;

    let source = recurring_transaction(
        user_id,
        account_id,
        TransactionKind::Expense,
        "50.00",
        RecurringInterval::Monthly,
    );
    let source_id = source.id;
    store.insert_transaction(source).await;

    let materializer = Arc::new(TransactionMaterializer::new(store.clone()));
    let dispatcher = BatchDispatcher::new(materializer, fast_retry());
    let summary = dispatcher
        .dispatch(vec![
            DueTransaction {
                // Unknown id: skipped without failing the batch.
                transaction_id: Uuid::new_v4(),
                user_id,
            },
            DueTransaction {
                transaction_id: source_id,
                user_id,
            },
        ])
        .await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    let account = store
        .find_account(account_id, user_id)
        .await
        .expect("store read")
        .expect("account exists");
    assert_eq!(account.balance, dec("950.00"));
}

#[tokio::test(start_paused = true)]
async fn owner_throttle_defers_work_past_the_ceiling_to_the_next_window() {
    let window = Duration::from_secs(60);
    let throttle = OwnerThrottle::new(2, window);
    let owner = Uuid::new_v4();

    let start = tokio::time::Instant::now();
    throttle.acquire(owner).await;
    throttle.acquire(owner).await;
    assert!(start.elapsed() < window);

    // Third acquisition waits for the window to reset instead of failing.
    throttle.acquire(owner).await;
    assert!(start.elapsed() >= window);
}

#[tokio::test(start_paused = true)]
async fn owner_throttle_does_not_starve_other_owners() {
    let window = Duration::from_secs(60);
    let throttle = OwnerThrottle::new(1, window);
    let busy_owner = Uuid::new_v4();
    let other_owner = Uuid::new_v4();

    let start = tokio::time::Instant::now();
    throttle.acquire(busy_owner).await;
    // A different owner has its own window and proceeds immediately.
    throttle.acquire(other_owner).await;
    assert!(start.elapsed() < window);
}
