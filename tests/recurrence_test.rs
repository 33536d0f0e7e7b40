// Calendar arithmetic for the recurrence calculator.

use chrono::NaiveDate;

use finance_tracker_api::models::RecurringInterval;
use finance_tracker_api::services::recurrence::next_occurrence;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn daily_adds_one_day() {
    assert_eq!(
        next_occurrence(date(2024, 3, 15), RecurringInterval::Daily),
        date(2024, 3, 16)
    );
    // across a month boundary
    assert_eq!(
        next_occurrence(date(2024, 4, 30), RecurringInterval::Daily),
        date(2024, 5, 1)
    );
}

#[test]
fn weekly_adds_seven_days() {
    assert_eq!(
        next_occurrence(date(2024, 3, 28), RecurringInterval::Weekly),
        date(2024, 4, 4)
    );
}

#[test]
fn monthly_clamps_to_last_valid_day() {
    // Jan 31 + 1 month never yields Feb 31
    assert_eq!(
        next_occurrence(date(2025, 1, 31), RecurringInterval::Monthly),
        date(2025, 2, 28)
    );
    // leap year
    assert_eq!(
        next_occurrence(date(2024, 1, 31), RecurringInterval::Monthly),
        date(2024, 2, 29)
    );
    assert_eq!(
        next_occurrence(date(2024, 3, 31), RecurringInterval::Monthly),
        date(2024, 4, 30)
    );
}

#[test]
fn monthly_rolls_over_year_end() {
    assert_eq!(
        next_occurrence(date(2024, 12, 15), RecurringInterval::Monthly),
        date(2025, 1, 15)
    );
}

#[test]
fn yearly_handles_leap_day() {
    assert_eq!(
        next_occurrence(date(2024, 2, 29), RecurringInterval::Yearly),
        date(2025, 2, 28)
    );
    assert_eq!(
        next_occurrence(date(2023, 6, 1), RecurringInterval::Yearly),
        date(2024, 6, 1)
    );
}

#[test]
fn next_occurrence_is_strictly_later_for_every_interval() {
    let intervals = [
        RecurringInterval::Daily,
        RecurringInterval::Weekly,
        RecurringInterval::Monthly,
        RecurringInterval::Yearly,
    ];
    let references = [
        date(2023, 1, 1),
        date(2024, 2, 29),
        date(2024, 12, 31),
        date(2025, 7, 4),
    ];
    for interval in intervals {
        for reference in references {
            assert!(
                next_occurrence(reference, interval) > reference,
                "{interval:?} from {reference} did not advance"
            );
        }
    }
}

#[test]
fn unknown_interval_is_rejected_at_the_parse_boundary() {
    assert_eq!(RecurringInterval::from_str("FORTNIGHTLY"), None);
    assert_eq!(
        RecurringInterval::from_str("monthly"),
        Some(RecurringInterval::Monthly)
    );
}
