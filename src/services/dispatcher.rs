//! Fans due transactions out to independently retryable units of work.
//!
//! One tokio task per transaction: a failure materializing one item never
//! blocks or rolls back another. A per-owner ceiling keeps a single user's
//! backlog from monopolizing the workers, and transient failures retry with
//! bounded exponential backoff. At-least-once delivery is safe because the
//! materializer is idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::models::UserId;
use crate::services::materializer::TransactionMaterializer;
use crate::store::{DueTransaction, MaterializeOutcome};

/// At most this many materializations per owner within one rolling window.
const MAX_PER_OWNER_PER_WINDOW: u32 = 10;
const OWNER_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Base delay doubling per attempt.
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

struct ThrottleEntry {
    count: u32,
    reset_at: Instant,
}

/// Rolling-window counter per owner. Unlike an HTTP rate limiter, a unit
/// that hits the ceiling waits for the window to reset instead of failing.
pub struct OwnerThrottle {
    limits: RwLock<HashMap<UserId, ThrottleEntry>>,
    max_per_window: u32,
    window: Duration,
}

impl OwnerThrottle {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            limits: RwLock::new(HashMap::new()),
            max_per_window,
            window,
        }
    }

    pub async fn acquire(&self, owner: UserId) {
        loop {
            let wait_until = {
                let mut limits = self.limits.write().await;
                let now = Instant::now();

                // Clean up old entries periodically
                if limits.len() > 10_000 {
                    limits.retain(|_, entry| entry.reset_at > now);
                }

                match limits.get_mut(&owner) {
                    Some(entry) if entry.reset_at <= now => {
                        entry.count = 1;
                        entry.reset_at = now + self.window;
                        return;
                    }
                    Some(entry) if entry.count < self.max_per_window => {
                        entry.count += 1;
                        return;
                    }
                    Some(entry) => entry.reset_at,
                    None => {
                        limits.insert(
                            owner,
                            ThrottleEntry {
                                count: 1,
                                reset_at: now + self.window,
                            },
                        );
                        return;
                    }
                }
            };
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum UnitOutcome {
    Processed,
    Skipped,
    Failed,
}

pub struct BatchDispatcher {
    materializer: Arc<TransactionMaterializer>,
    throttle: Arc<OwnerThrottle>,
    retry: RetryPolicy,
}

impl BatchDispatcher {
    pub fn new(materializer: Arc<TransactionMaterializer>, retry: RetryPolicy) -> Self {
        Self::with_throttle(
            materializer,
            retry,
            OwnerThrottle::new(MAX_PER_OWNER_PER_WINDOW, OWNER_WINDOW),
        )
    }

    pub fn with_throttle(
        materializer: Arc<TransactionMaterializer>,
        retry: RetryPolicy,
        throttle: OwnerThrottle,
    ) -> Self {
        Self {
            materializer,
            throttle: Arc::new(throttle),
            retry,
        }
    }

    /// One independent unit of work per due transaction. Processing order is
    /// irrelevant to correctness; only atomicity-per-item matters.
    pub async fn dispatch(&self, due: Vec<DueTransaction>) -> DispatchSummary {
        let handles: Vec<_> = due
            .into_iter()
            .map(|item| {
                let materializer = self.materializer.clone();
                let throttle = self.throttle.clone();
                let retry = self.retry.clone();
                tokio::spawn(async move { process_one(materializer, throttle, retry, item).await })
            })
            .collect();

        let mut summary = DispatchSummary::default();
        for result in join_all(handles).await {
            match result {
                Ok(UnitOutcome::Processed) => summary.processed += 1,
                Ok(UnitOutcome::Skipped) => summary.skipped += 1,
                Ok(UnitOutcome::Failed) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "materialization task panicked");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

async fn process_one(
    materializer: Arc<TransactionMaterializer>,
    throttle: Arc<OwnerThrottle>,
    retry: RetryPolicy,
    item: DueTransaction,
) -> UnitOutcome {
    throttle.acquire(item.user_id).await;

    let mut attempt = 0u32;
    loop {
        match materializer
            .materialize(item.transaction_id, item.user_id)
            .await
        {
            Ok(MaterializeOutcome::Applied) => return UnitOutcome::Processed,
            Ok(_) => return UnitOutcome::Skipped,
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                warn!(
                    transaction_id = %item.transaction_id,
                    attempt,
                    error = %e,
                    "transient materialization failure, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                // Terminal for this cycle; the item stays due and the next
                // selector pass picks it up again.
                error!(
                    transaction_id = %item.transaction_id,
                    error = %e,
                    "materialization failed"
                );
                return UnitOutcome::Failed;
            }
        }
    }
}
