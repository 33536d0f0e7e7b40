//! Calendar-month helpers for budget and report windows.

use chrono::{Datelike, Months, NaiveDate};

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date.with_day(1).expect("day 1 is valid in every month");
    let end = start
        .checked_add_months(Months::new(1))
        .expect("date overflow adding one month")
        .pred_opt()
        .expect("month start has a predecessor");
    (start, end)
}

/// First and last day of the month before the one containing `date`.
pub fn previous_month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let this_month_start = date.with_day(1).expect("day 1 is valid in every month");
    let start = this_month_start
        .checked_sub_months(Months::new(1))
        .expect("date underflow subtracting one month");
    let end = this_month_start
        .pred_opt()
        .expect("month start has a predecessor");
    (start, end)
}
