use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AccountId, UserId};

/// A user account. `balance` is the authoritative running total, adjusted
/// incrementally in the same store transaction as the ledger write that
/// caused the change; it is never recomputed from transaction history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub name: String,
    pub balance: Decimal,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}
