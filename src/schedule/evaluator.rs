//! Time-window evaluation.

use chrono::{DateTime, Datelike, Utc};

use crate::model::TimeRestriction;

/// Outcome of evaluating a rule's time restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleVerdict {
    /// At least one restriction permits `now`, or none exist.
    Allowed,

    /// Restrictions exist and none permits `now`.
    Restricted,
}

/// Evaluate a rule's restrictions at `now`.
///
/// Restrictions combine disjunctively: the request is admitted when *any*
/// entry permits the instant, which is what lets operators express
/// "weekdays 9-5 or weekends 10-2" as two entries.
#[must_use]
pub fn evaluate(restrictions: &[TimeRestriction], now: DateTime<Utc>) -> ScheduleVerdict {
    if restrictions.is_empty() {
        return ScheduleVerdict::Allowed;
    }

    if restrictions.iter().any(|r| entry_permits(r, now)) {
        ScheduleVerdict::Allowed
    } else {
        ScheduleVerdict::Restricted
    }
}

/// Whether a single entry permits `now`.
///
/// Both components must hold; an absent component is permissive. Evaluation
/// is UTC; the record's `timezone` field is carried but unused.
fn entry_permits(restriction: &TimeRestriction, now: DateTime<Utc>) -> bool {
    if let Some(ref days) = restriction.days_of_week {
        if !days.is_empty() {
            let today = now.weekday().number_from_monday() as u8;
            if !days.contains(&today) {
                return false;
            }
        }
    }

    match (restriction.start_time, restriction.end_time) {
        (Some(start), Some(end)) => {
            let current = now.time();
            if start < end {
                start <= current && current <= end
            } else if start > end {
                // Wraps midnight: 22:00-06:00 admits late evening and early
                // morning.
                current >= start || current <= end
            } else {
                true
            }
        },
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn entry(id: i64) -> TimeRestriction {
        TimeRestriction::new(id, 1)
    }

    #[test]
    fn test_no_restrictions_allow() {
        assert_eq!(evaluate(&[], at(2024, 6, 3, 12, 0)), ScheduleVerdict::Allowed);
    }

    #[test]
    fn test_plain_window() {
        let windows = vec![entry(1).with_window(time(9, 0), time(17, 0))];

        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 12, 0)),
            ScheduleVerdict::Allowed
        );
        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 8, 59)),
            ScheduleVerdict::Restricted
        );
        // Bounds are inclusive.
        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 9, 0)),
            ScheduleVerdict::Allowed
        );
        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 17, 0)),
            ScheduleVerdict::Allowed
        );
    }

    #[test]
    fn test_midnight_wrap() {
        // 22:00-06:00 every day.
        let windows =
            vec![entry(1).with_window(time(22, 0), time(6, 0)).with_days(vec![1, 2, 3, 4, 5, 6, 7])];

        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 23, 30)),
            ScheduleVerdict::Allowed
        );
        assert_eq!(
            evaluate(&windows, at(2024, 6, 4, 5, 0)),
            ScheduleVerdict::Allowed
        );
        assert_eq!(
            evaluate(&windows, at(2024, 6, 4, 7, 0)),
            ScheduleVerdict::Restricted
        );
    }

    #[test]
    fn test_equal_bounds_permit() {
        let windows = vec![entry(1).with_window(time(9, 0), time(9, 0))];
        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 3, 0)),
            ScheduleVerdict::Allowed
        );
    }

    #[test]
    fn test_day_component() {
        // 2024-06-03 is a Monday.
        let weekdays_only = vec![entry(1).with_days(vec![1, 2, 3, 4, 5])];

        assert_eq!(
            evaluate(&weekdays_only, at(2024, 6, 3, 12, 0)),
            ScheduleVerdict::Allowed
        );
        // 2024-06-08 is a Saturday.
        assert_eq!(
            evaluate(&weekdays_only, at(2024, 6, 8, 12, 0)),
            ScheduleVerdict::Restricted
        );
    }

    #[test]
    fn test_day_and_time_both_required() {
        let entry = entry(1)
            .with_days(vec![1])
            .with_window(time(9, 0), time(17, 0));
        let windows = vec![entry];

        // Right day, wrong time.
        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 20, 0)),
            ScheduleVerdict::Restricted
        );
        // Wrong day, right time.
        assert_eq!(
            evaluate(&windows, at(2024, 6, 4, 12, 0)),
            ScheduleVerdict::Restricted
        );
        // Both.
        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 12, 0)),
            ScheduleVerdict::Allowed
        );
    }

    #[test]
    fn test_disjunctive_combination() {
        // Weekdays 9-17 OR weekends 10-14.
        let windows = vec![
            entry(1)
                .with_days(vec![1, 2, 3, 4, 5])
                .with_window(time(9, 0), time(17, 0)),
            entry(2)
                .with_days(vec![6, 7])
                .with_window(time(10, 0), time(14, 0)),
        ];

        // Monday noon: first entry.
        assert_eq!(
            evaluate(&windows, at(2024, 6, 3, 12, 0)),
            ScheduleVerdict::Allowed
        );
        // Saturday noon: second entry.
        assert_eq!(
            evaluate(&windows, at(2024, 6, 8, 12, 0)),
            ScheduleVerdict::Allowed
        );
        // Saturday evening: neither.
        assert_eq!(
            evaluate(&windows, at(2024, 6, 8, 18, 0)),
            ScheduleVerdict::Restricted
        );
    }

    #[test]
    fn test_partial_bounds_are_permissive() {
        let mut only_start = entry(1);
        only_start.start_time = Some(time(9, 0));
        assert_eq!(
            evaluate(&[only_start], at(2024, 6, 3, 3, 0)),
            ScheduleVerdict::Allowed
        );
    }

    #[test]
    fn test_empty_day_list_is_permissive() {
        // Validation rejects empty lists, but the evaluator must not trust
        // operator data.
        let mut malformed = entry(1);
        malformed.days_of_week = Some(vec![]);
        assert_eq!(
            evaluate(&[malformed], at(2024, 6, 3, 12, 0)),
            ScheduleVerdict::Allowed
        );
    }
}
