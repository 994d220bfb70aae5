//! Ledger timestamp codec and stay-duration arithmetic.

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use std::cell::Cell;

/// On-disk timestamp layout, e.g. `14:05:09 del 17-10-2026`.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S del %d-%m-%Y";

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Malformed text yields `None`, never an error.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

/// Minutes between `entered` and `now`, clamped at zero and rounded to two decimals.
pub fn duration_minutes(entered: NaiveDateTime, now: NaiveDateTime) -> f64 {
    let millis = (now - entered).num_milliseconds().max(0);
    let minutes = millis as f64 / 60_000.0;
    (minutes * 100.0).round() / 100.0
}

/// Render a duration the way the ledger stores it.
pub fn format_minutes(minutes: f64) -> String {
    format!("{minutes:.2}")
}

/// Source of "now" for the authorization engine.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Host local time, truncated to whole seconds so the value handed to the
/// engine is exactly what the ledger can represent.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Manually driven clock.
pub struct FixedClock {
    now: Cell<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self { now: Cell::new(at) }
    }

    pub fn set(&self, at: NaiveDateTime) {
        self.now.set(at);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_format_matches_ledger_layout() {
        assert_eq!(format_timestamp(&at(8, 4, 2)), "08:04:02 del 09-03-2025");
    }

    #[test]
    fn test_parse_accepts_stored_text() {
        assert_eq!(parse_timestamp("08:04:02 del 09-03-2025"), Some(at(8, 4, 2)));
        assert_eq!(parse_timestamp("  08:04:02 del 09-03-2025\n"), Some(at(8, 4, 2)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("2025-03-09 08:04:02"), None);
        assert_eq!(parse_timestamp("25:00:00 del 09-03-2025"), None);
    }

    #[test]
    fn test_duration_rounds_to_two_decimals() {
        assert_eq!(duration_minutes(at(8, 0, 0), at(8, 5, 0)), 5.0);
        // 100 seconds = 1.666.. minutes
        assert_eq!(duration_minutes(at(8, 0, 0), at(8, 1, 40)), 1.67);
        assert_eq!(format_minutes(duration_minutes(at(8, 0, 0), at(8, 5, 0))), "5.00");
    }

    #[test]
    fn test_duration_clamps_negative_to_zero() {
        assert_eq!(duration_minutes(at(9, 0, 0), at(8, 0, 0)), 0.0);
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::new(at(8, 0, 0));
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), at(8, 5, 0));
    }
}
