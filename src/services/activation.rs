//! Fence activation clock
//!
//! Fences carry a daily time window ("08:00-18:00"). A window whose start is
//! later than its end wraps past midnight ("22:00-06:00"). Missing or
//! unparseable windows mean "no restriction": the fence is always active.
//!
//! Activity depends on wall-clock time, so it is recomputed every tick.

use chrono::{Local, NaiveTime, Timelike};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeOfDayError {
    #[error("empty time of day")]
    Empty,
    #[error("invalid time of day '{0}'")]
    Invalid(String),
    #[error("time of day '{0}' out of range")]
    OutOfRange(String),
    #[error("time window '{0}' is not of the form START-END")]
    MalformedRange(String),
}

/// Parse "HH:MM", "HH.MM" or "HH" into minutes since midnight
///
/// A trailing seconds component ("HH:MM:SS") is accepted and ignored.
pub fn parse_minutes(s: &str) -> Result<u16, TimeOfDayError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(TimeOfDayError::Empty);
    }

    let normalized = s.replace('.', ":");
    let mut parts = normalized.split(':');
    let invalid = || TimeOfDayError::Invalid(s.to_string());

    let hour: u16 = parts.next().ok_or_else(invalid)?.trim().parse().map_err(|_| invalid())?;
    let minute: u16 = match parts.next() {
        Some(m) => m.trim().parse().map_err(|_| invalid())?,
        None => 0,
    };
    if let Some(sec) = parts.next() {
        sec.trim().parse::<u16>().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    if hour > 23 || minute > 59 {
        return Err(TimeOfDayError::OutOfRange(s.to_string()));
    }
    Ok(hour * 60 + minute)
}

/// Minutes since midnight, seconds discarded
#[inline]
pub fn minutes_of_day(t: NaiveTime) -> u16 {
    (t.hour() * 60 + t.minute()) as u16
}

/// A daily activation window, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: u16,
    end: u16,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeOfDayError> {
        Ok(Self { start: parse_minutes(start)?, end: parse_minutes(end)? })
    }

    /// Parse the catalog form "START-END", e.g. "08:00-18:00" or "5.00-23.00"
    pub fn parse_range(range: &str) -> Result<Self, TimeOfDayError> {
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| TimeOfDayError::MalformedRange(range.to_string()))?;
        Self::parse(start, end)
    }

    #[inline]
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains_minute(&self, now: u16) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }

    #[inline]
    pub fn contains(&self, now: NaiveTime) -> bool {
        self.contains_minute(minutes_of_day(now))
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

/// Whether a fence with the given start/end strings applies at `now`
///
/// Missing either end means always active. Unparseable values are logged
/// and also treated as always active.
pub fn is_active(start: Option<&str>, end: Option<&str>, now: NaiveTime) -> bool {
    match (start, end) {
        (Some(start), Some(end)) => match TimeWindow::parse(start, end) {
            Ok(window) => window.contains(now),
            Err(e) => {
                warn!(start = %start, end = %end, error = %e, "fence_window_unparseable");
                true
            }
        },
        _ => true,
    }
}

/// Resolve a fence window from separate start/end fields or a combined range
///
/// Returns `None` (always active) when nothing usable is configured.
pub fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
    effective: Option<&str>,
) -> Option<TimeWindow> {
    let start = start.map(str::trim).filter(|s| !s.is_empty());
    let end = end.map(str::trim).filter(|s| !s.is_empty());
    let effective = effective.map(str::trim).filter(|s| !s.is_empty());

    let parsed = match (start, end, effective) {
        (Some(start), Some(end), _) => TimeWindow::parse(start, end),
        (_, _, Some(range)) => TimeWindow::parse_range(range),
        _ => return None,
    };

    match parsed {
        Ok(window) => Some(window),
        Err(e) => {
            warn!(error = %e, "fence_window_unparseable");
            None
        }
    }
}

/// Wall-clock reading for one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTime {
    /// Local time of day, used for fence windows
    pub local: NaiveTime,
    /// Epoch milliseconds, stamped on alarms
    pub epoch_ms: u64,
}

impl TickTime {
    pub fn now() -> Self {
        let now = Local::now();
        Self { local: now.time(), epoch_ms: now.timestamp_millis().max(0) as u64 }
    }

    pub fn at(local: NaiveTime, epoch_ms: u64) -> Self {
        Self { local, epoch_ms }
    }

    /// Convenience for tests and replays: `hh:mm` today, fixed epoch
    pub fn hm(hour: u32, minute: u32, epoch_ms: u64) -> Self {
        let local = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
        Self { local, epoch_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_minutes_formats() {
        assert_eq!(parse_minutes("08:30"), Ok(510));
        assert_eq!(parse_minutes("5.00"), Ok(300));
        assert_eq!(parse_minutes(" 23:59 "), Ok(1439));
        assert_eq!(parse_minutes("7"), Ok(420));
        assert_eq!(parse_minutes("07:15:42"), Ok(435));
    }

    #[test]
    fn test_parse_minutes_rejects_garbage() {
        assert_eq!(parse_minutes(""), Err(TimeOfDayError::Empty));
        assert!(matches!(parse_minutes("ab:cd"), Err(TimeOfDayError::Invalid(_))));
        assert!(matches!(parse_minutes("24:00"), Err(TimeOfDayError::OutOfRange(_))));
        assert!(matches!(parse_minutes("12:60"), Err(TimeOfDayError::OutOfRange(_))));
        assert!(matches!(parse_minutes("1:2:3:4"), Err(TimeOfDayError::Invalid(_))));
    }

    #[test]
    fn test_same_day_window_inclusive() {
        let window = TimeWindow::parse("08:00", "18:00").unwrap();
        assert!(!window.wraps_midnight());
        assert!(window.contains(t(8, 0)));
        assert!(window.contains(t(12, 0)));
        assert!(window.contains(t(18, 0)));
        assert!(!window.contains(t(18, 1)));
        assert!(!window.contains(t(7, 59)));
    }

    #[test]
    fn test_overnight_window() {
        let window = TimeWindow::parse_range("22:00-06:00").unwrap();
        assert!(window.wraps_midnight());
        assert!(window.contains(t(23, 30)));
        assert!(window.contains(t(0, 0)));
        assert!(window.contains(t(6, 0)));
        assert!(!window.contains(t(6, 1)));
        assert!(!window.contains(t(12, 0)));
        assert!(window.contains(t(22, 0)));
    }

    #[test]
    fn test_seconds_are_ignored() {
        let window = TimeWindow::parse("08:00", "18:00").unwrap();
        let late = NaiveTime::from_hms_opt(18, 0, 59).unwrap();
        assert!(window.contains(late));
    }

    #[test]
    fn test_is_active_missing_is_open() {
        assert!(is_active(None, None, t(3, 0)));
        assert!(is_active(Some("08:00"), None, t(3, 0)));
        assert!(is_active(None, Some("18:00"), t(3, 0)));
    }

    #[test]
    fn test_is_active_unparseable_is_open() {
        assert!(is_active(Some("soon"), Some("later"), t(3, 0)));
    }

    #[test]
    fn test_is_active_window() {
        assert!(is_active(Some("08:00"), Some("18:00"), t(9, 0)));
        assert!(!is_active(Some("08:00"), Some("18:00"), t(19, 0)));
    }

    #[test]
    fn test_resolve_window_prefers_split_fields() {
        let window = resolve_window(Some("09:00"), Some("10:00"), Some("00:00-23:59")).unwrap();
        assert_eq!(window.to_string(), "09:00-10:00");
    }

    #[test]
    fn test_resolve_window_from_range_and_fallbacks() {
        assert_eq!(
            resolve_window(None, None, Some("5.00-23.00")).unwrap().to_string(),
            "05:00-23:00"
        );
        assert_eq!(resolve_window(None, None, None), None);
        assert_eq!(resolve_window(Some(""), Some(""), Some("  ")), None);
        assert_eq!(resolve_window(None, None, Some("all day")), None);
    }

    #[test]
    fn test_tick_time_hm() {
        let tick = TickTime::hm(13, 45, 99);
        assert_eq!(minutes_of_day(tick.local), 13 * 60 + 45);
        assert_eq!(tick.epoch_ms, 99);
    }
}
