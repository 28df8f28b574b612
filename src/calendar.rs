//! Service hours and operational-day arithmetic.
//!
//! An operational day runs from a fixed start-of-service clock time to the
//! same time the next calendar day, so records observed after midnight but
//! before start of service still belong to the previous date's timetable.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::HashSet;

/// Daily service hours, crossing midnight (e.g. 04:50 to 01:30 next day).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ServiceWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether trains are running at the given clock time.
    pub fn is_active(&self, t: NaiveTime) -> bool {
        t >= self.start || t <= self.end
    }

    /// Time remaining until the next start of service, same-day when `now`
    /// is in the early-morning gap, next-day otherwise.
    pub fn until_next_start(&self, now: NaiveDateTime) -> Duration {
        let today_start = now.date().and_time(self.start);
        if now < today_start {
            today_start - now
        } else {
            today_start + Duration::days(1) - now
        }
    }

    /// The operational date `now` belongs to. Rolls over at the start of
    /// service, not at midnight.
    pub fn operational_date(&self, now: NaiveDateTime) -> NaiveDate {
        let start_offset = self.start - NaiveTime::MIN;
        (now - start_offset).date()
    }

    /// Materializes a timetable clock time onto the operational day: times
    /// earlier than the start of service fall on the next calendar date.
    pub fn service_datetime(&self, op_date: NaiveDate, t: NaiveTime) -> NaiveDateTime {
        if t < self.start {
            op_date.succ_opt().unwrap_or(op_date).and_time(t)
        } else {
            op_date.and_time(t)
        }
    }
}

impl Default for ServiceWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(4, 50, 0).unwrap(),
            end: NaiveTime::from_hms_opt(1, 30, 0).unwrap(),
        }
    }
}

/// Selects the timetable partition for a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayCode {
    Weekday,
    Holiday,
}

impl DayCode {
    /// Numeric code as used by the timetable data (8 weekday, 9 holiday).
    pub fn code(&self) -> u8 {
        match self {
            DayCode::Weekday => 8,
            DayCode::Holiday => 9,
        }
    }
}

/// Listed public holidays plus the built-in weekend rule.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    dates: HashSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || self.dates.contains(&date)
    }
}

/// One operational day: the date trains are running under and which
/// timetable partition applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationalDay {
    pub date: NaiveDate,
    pub day_code: DayCode,
}

impl OperationalDay {
    pub fn at(now: NaiveDateTime, window: &ServiceWindow, holidays: &HolidayCalendar) -> Self {
        let date = window.operational_date(now);
        let day_code = if holidays.is_holiday(date) {
            DayCode::Holiday
        } else {
            DayCode::Weekday
        };
        Self { date, day_code }
    }

    /// Remaps an observed timestamp's time of day onto this operational
    /// day's window, discarding the timestamp's own date part.
    pub fn observed_datetime(
        &self,
        observed: NaiveDateTime,
        window: &ServiceWindow,
    ) -> NaiveDateTime {
        window.service_datetime(self.date, observed.time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_window_crosses_midnight() {
        let w = ServiceWindow::default();
        assert!(w.is_active(t(4, 50, 0)));
        assert!(w.is_active(t(12, 0, 0)));
        assert!(w.is_active(t(23, 59, 59)));
        assert!(w.is_active(t(0, 30, 0)));
        assert!(w.is_active(t(1, 30, 0)));
        assert!(!w.is_active(t(1, 30, 1)));
        assert!(!w.is_active(t(3, 0, 0)));
        assert!(!w.is_active(t(4, 49, 59)));
    }

    #[test]
    fn test_until_next_start() {
        let w = ServiceWindow::default();
        // Early-morning gap: next start is the same day.
        let gap = dt(2024, 3, 5, 2, 0);
        assert_eq!(w.until_next_start(gap), Duration::minutes(2 * 60 + 50));
        // Evening: next start is tomorrow.
        let evening = dt(2024, 3, 5, 23, 0);
        assert_eq!(w.until_next_start(evening), Duration::minutes(5 * 60 + 50));
    }

    #[test]
    fn test_operational_date_rolls_over_at_service_start() {
        let w = ServiceWindow::default();
        // Past midnight but before start of service: still yesterday's day.
        assert_eq!(
            w.operational_date(dt(2024, 3, 6, 0, 40)),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(
            w.operational_date(dt(2024, 3, 6, 4, 30)),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        // At and after start of service: the new day.
        assert_eq!(
            w.operational_date(dt(2024, 3, 6, 4, 50)),
            NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
        );
        assert_eq!(
            w.operational_date(dt(2024, 3, 6, 12, 0)),
            NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()
        );
    }

    #[test]
    fn test_service_datetime_maps_early_times_to_next_date() {
        let w = ServiceWindow::default();
        let op = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(w.service_datetime(op, t(23, 50, 0)), dt(2024, 3, 5, 23, 50));
        assert_eq!(w.service_datetime(op, t(0, 15, 0)), dt(2024, 3, 6, 0, 15));
        assert_eq!(w.service_datetime(op, t(4, 49, 0)), dt(2024, 3, 6, 4, 49));
        assert_eq!(w.service_datetime(op, t(4, 50, 0)), dt(2024, 3, 5, 4, 50));
    }

    #[test]
    fn test_day_code_classification() {
        let holidays = HolidayCalendar::new([NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()]);
        let w = ServiceWindow::default();

        // 2024-03-05 is a Tuesday.
        let weekday = OperationalDay::at(dt(2024, 3, 5, 10, 0), &w, &holidays);
        assert_eq!(weekday.day_code, DayCode::Weekday);
        assert_eq!(weekday.day_code.code(), 8);

        // 2024-03-09 is a Saturday, 2024-03-10 a Sunday.
        let sat = OperationalDay::at(dt(2024, 3, 9, 10, 0), &w, &holidays);
        assert_eq!(sat.day_code, DayCode::Holiday);
        let sun = OperationalDay::at(dt(2024, 3, 10, 10, 0), &w, &holidays);
        assert_eq!(sun.day_code.code(), 9);

        // 2024-03-01 is a Friday but listed as a public holiday.
        let listed = OperationalDay::at(dt(2024, 3, 1, 10, 0), &w, &holidays);
        assert_eq!(listed.day_code, DayCode::Holiday);
    }
}
