//! Ledger transactions. Amounts are unsigned; the sign of a balance effect
//! is implied by the kind. Recurring transactions additionally carry a
//! schedule (interval, last-processed, next-due) that only the materializer
//! advances once it fires.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{AccountId, TransactionId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "INCOME",
            TransactionKind::Expense => "EXPENSE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "INCOME" => Some(TransactionKind::Income),
            "EXPENSE" => Some(TransactionKind::Expense),
            _ => None,
        }
    }

    /// Balance effect of an amount of this kind: expenses subtract, income adds.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecurringInterval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurringInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringInterval::Daily => "DAILY",
            RecurringInterval::Weekly => "WEEKLY",
            RecurringInterval::Monthly => "MONTHLY",
            RecurringInterval::Yearly => "YEARLY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DAILY" => Some(RecurringInterval::Daily),
            "WEEKLY" => Some(RecurringInterval::Weekly),
            "MONTHLY" => Some(RecurringInterval::Monthly),
            "YEARLY" => Some(RecurringInterval::Yearly),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecurringInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub is_recurring: bool,
    pub recurring_interval: Option<RecurringInterval>,
    pub last_processed: Option<DateTime<Utc>>,
    pub next_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// A recurring transaction is due when it has never been processed or its
    /// next occurrence date has arrived.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_recurring
            && (self.last_processed.is_none()
                || self.next_due_date.is_some_and(|d| d <= today))
    }
}
