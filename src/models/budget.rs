use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Monthly spending ceiling, one per user (upsert semantics).
/// `last_alert_sent` suppresses repeat alerts within a calendar month.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Budget {
    pub user_id: UserId,
    pub amount: Decimal,
    pub last_alert_sent: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
