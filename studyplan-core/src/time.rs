//! Time utilities: ISO dates and `HH:MM - HH:MM` ranges.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?P<sh>\d{1,2}):(?P<sm>\d{2})\s*-\s*(?P<eh>\d{1,2}):(?P<em>\d{2})\s*$")
            .expect("static time range pattern")
    })
}

/// A same-day clock range in minutes since midnight, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    /// Parse `"HH:MM - HH:MM"` (single-digit hours accepted).
    ///
    /// Returns `None` for malformed text, clock values out of range, or
    /// ranges that do not move forward.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = range_re().captures(s)?;
        let start = clock_minutes(&caps["sh"], &caps["sm"])?;
        let end = clock_minutes(&caps["eh"], &caps["em"])?;
        if start >= end {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn hours(&self) -> f64 {
        f64::from(self.end - self.start) / 60.0
    }

    /// Zero-padded `HH:MM` start, the sort key used by the overlap sweep.
    pub fn start_label(&self) -> String {
        format_clock(self.start)
    }

    pub fn end_label(&self) -> String {
        format_clock(self.end)
    }
}

fn clock_minutes(h: &str, m: &str) -> Option<u16> {
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    // 24:00 is allowed as an end-of-day marker.
    if m > 59 || h > 24 || (h == 24 && m != 0) {
        return None;
    }
    Some(h * 60 + m)
}

fn format_clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Render an hour count the way it appears in logs: `2.0`, `2.5`, `1.25`.
pub fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{hours:.1}")
    } else {
        format!("{hours}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_and_unpadded_ranges() {
        let r = TimeRange::parse("09:00 - 11:30").unwrap();
        assert_eq!((r.start, r.end), (540, 690));
        assert_eq!(r.hours(), 2.5);

        let r = TimeRange::parse("9:05-10:00").unwrap();
        assert_eq!(r.start_label(), "09:05");
        assert_eq!(r.end_label(), "10:00");
    }

    #[test]
    fn rejects_malformed_or_backwards_ranges() {
        assert!(TimeRange::parse("morning").is_none());
        assert!(TimeRange::parse("11:00 - 09:00").is_none());
        assert!(TimeRange::parse("10:00 - 10:00").is_none());
        assert!(TimeRange::parse("10:75 - 11:00").is_none());
        assert!(TimeRange::parse("23:00 - 24:00").is_some());
    }

    #[test]
    fn hours_keep_one_decimal() {
        assert_eq!(format_hours(6.0), "6.0");
        assert_eq!(format_hours(2.5), "2.5");
    }

    #[test]
    fn iso_dates_only() {
        assert_eq!(parse_iso_date("2026-01-25"), NaiveDate::from_ymd_opt(2026, 1, 25));
        assert!(parse_iso_date("Jan 25").is_none());
        assert!(parse_iso_date("Not specified").is_none());
    }
}
