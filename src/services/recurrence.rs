//! Next-occurrence arithmetic for recurring transactions.

use chrono::{Days, Months, NaiveDate};

use crate::models::RecurringInterval;

/// Add exactly one unit of `interval` to `reference` using calendar-aware
/// arithmetic. Month and year additions clamp the day-of-month to the last
/// valid day of the target month (Jan 31 + 1 month = Feb 28/29).
pub fn next_occurrence(reference: NaiveDate, interval: RecurringInterval) -> NaiveDate {
    match interval {
        RecurringInterval::Daily => reference
            .checked_add_days(Days::new(1))
            .expect("date overflow adding one day"),
        RecurringInterval::Weekly => reference
            .checked_add_days(Days::new(7))
            .expect("date overflow adding one week"),
        RecurringInterval::Monthly => reference
            .checked_add_months(Months::new(1))
            .expect("date overflow adding one month"),
        RecurringInterval::Yearly => reference
            .checked_add_months(Months::new(12))
            .expect("date overflow adding one year"),
    }
}
