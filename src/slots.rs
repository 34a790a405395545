//! Slot generation: fixed-length sub-intervals of a window, and recurring
//! date expansion. Pure functions; the engine materializes the results.

use chrono::{Datelike, Duration, NaiveDate};

use crate::engine::EngineError;
use crate::model::{Span, Stamp};

/// Set of weekdays, Sunday = 0 through Saturday = 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn new(days: &[u8]) -> Result<Self, EngineError> {
        let mut mask = 0u8;
        for &d in days {
            if d > 6 {
                return Err(EngineError::Validation("weekday must be 0-6 (Sunday = 0)"));
            }
            mask |= 1 << d;
        }
        Ok(Self(mask))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0 & (1 << date.weekday().num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Split `[start, end)` into consecutive `step_minutes` slots. A trailing
/// remainder that doesn't fit a whole slot is dropped. Empty when
/// `end <= start` or the step is non-positive.
pub fn fixed_slots(start: Stamp, end: Stamp, step_minutes: i64) -> Vec<Span> {
    if step_minutes <= 0 {
        return Vec::new();
    }
    let step = Duration::minutes(step_minutes);
    let mut slots = Vec::new();
    let mut cursor = start;
    while cursor + step <= end {
        slots.push(Span::new(cursor, cursor + step));
        cursor += step;
    }
    slots
}

/// Dates between `start` and `end` inclusive whose weekday is in `days`.
pub fn recurring_dates(
    start: NaiveDate,
    end: NaiveDate,
    days: WeekdaySet,
) -> Result<Vec<NaiveDate>, EngineError> {
    if end < start {
        return Err(EngineError::InvalidRange);
    }
    let mut dates = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        if days.contains(cursor) {
            dates.push(cursor);
        }
        cursor = match cursor.succ_opt() {
            Some(next) => next,
            None => break, // end of the calendar
        };
    }
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(h: u32, min: u32) -> Stamp {
        d(2031, 3, 1).and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn fixed_slots_exact_fit() {
        let slots = fixed_slots(at(9, 0), at(10, 0), 30);
        assert_eq!(
            slots,
            vec![
                Span::new(at(9, 0), at(9, 30)),
                Span::new(at(9, 30), at(10, 0)),
            ]
        );
    }

    #[test]
    fn fixed_slots_drops_partial_tail() {
        // 09:00-10:15 still yields only the two whole slots.
        let slots = fixed_slots(at(9, 0), at(10, 15), 30);
        assert_eq!(
            slots,
            vec![
                Span::new(at(9, 0), at(9, 30)),
                Span::new(at(9, 30), at(10, 0)),
            ]
        );
    }

    #[test]
    fn fixed_slots_window_shorter_than_step() {
        assert!(fixed_slots(at(9, 0), at(9, 20), 30).is_empty());
    }

    #[test]
    fn fixed_slots_empty_or_inverted_window() {
        assert!(fixed_slots(at(9, 0), at(9, 0), 30).is_empty());
        assert!(fixed_slots(at(10, 0), at(9, 0), 30).is_empty());
    }

    #[test]
    fn fixed_slots_nonpositive_step() {
        assert!(fixed_slots(at(9, 0), at(12, 0), 0).is_empty());
        assert!(fixed_slots(at(9, 0), at(12, 0), -15).is_empty());
    }

    #[test]
    fn fixed_slots_custom_step() {
        let slots = fixed_slots(at(9, 0), at(10, 0), 20);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[2], Span::new(at(9, 40), at(10, 0)));
    }

    #[test]
    fn weekday_set_rejects_out_of_range() {
        assert!(matches!(
            WeekdaySet::new(&[7]),
            Err(EngineError::Validation(_))
        ));
        assert!(WeekdaySet::new(&[0, 6]).is_ok());
        assert!(WeekdaySet::new(&[]).unwrap().is_empty());
    }

    #[test]
    fn recurring_dates_mon_wed_fri() {
        // 2024-12-02 is a Monday, 2024-12-08 a Sunday.
        let days = WeekdaySet::new(&[1, 3, 5]).unwrap();
        let dates = recurring_dates(d(2024, 12, 2), d(2024, 12, 8), days).unwrap();
        assert_eq!(
            dates,
            vec![d(2024, 12, 2), d(2024, 12, 4), d(2024, 12, 6)]
        );
    }

    #[test]
    fn recurring_dates_inclusive_bounds() {
        // Both endpoints are Sundays and Sunday is requested.
        let days = WeekdaySet::new(&[0]).unwrap();
        let dates = recurring_dates(d(2024, 12, 1), d(2024, 12, 8), days).unwrap();
        assert_eq!(dates, vec![d(2024, 12, 1), d(2024, 12, 8)]);
    }

    #[test]
    fn recurring_dates_single_day() {
        let days = WeekdaySet::new(&[1]).unwrap();
        let dates = recurring_dates(d(2024, 12, 2), d(2024, 12, 2), days).unwrap();
        assert_eq!(dates, vec![d(2024, 12, 2)]);
    }

    #[test]
    fn recurring_dates_inverted_range_fails() {
        let days = WeekdaySet::new(&[1]).unwrap();
        let result = recurring_dates(d(2024, 12, 8), d(2024, 12, 2), days);
        assert_eq!(result, Err(EngineError::InvalidRange));
    }

    #[test]
    fn recurring_dates_empty_set_yields_nothing() {
        let days = WeekdaySet::new(&[]).unwrap();
        let dates = recurring_dates(d(2024, 12, 2), d(2024, 12, 8), days).unwrap();
        assert!(dates.is_empty());
    }
}
