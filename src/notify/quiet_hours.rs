use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, ParseError, TimeZone, Utc};
use thiserror::Error;

/// Quiet hours settings that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuietHoursError {
    #[error("invalid quiet hours time `{value}`: {source}")]
    Time { value: String, source: ParseError },
    #[error("invalid UTC offset of {0} minutes")]
    Offset(i32),
}

/// A daily window of local time during which members are not messaged.
///
/// The window is `[start, end)` and wraps past midnight when `start > end`.
/// A window with `start == end` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: NaiveTime,
    end: NaiveTime,
    offset: FixedOffset,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime, offset: FixedOffset) -> Self {
        Self { start, end, offset }
    }

    /// Parse `HH:MM` bounds for a zone `utc_offset_minutes` east of UTC.
    pub fn parse(start: &str, end: &str, utc_offset_minutes: i32) -> Result<Self, QuietHoursError> {
        let parse_time = |value: &str| {
            NaiveTime::parse_from_str(value, "%H:%M").map_err(|source| QuietHoursError::Time {
                value: value.to_string(),
                source,
            })
        };
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or(QuietHoursError::Offset(utc_offset_minutes))?;
        Ok(Self::new(parse_time(start)?, parse_time(end)?, offset))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset).time();
        if self.start <= self.end {
            self.start <= local && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }

    /// The first instant at or after `at` that is outside the window.
    pub fn next_open(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        if !self.contains(at) {
            return at;
        }
        let local = at.with_timezone(&self.offset).naive_local();
        let mut open = local.date().and_time(self.end);
        if open <= local {
            open += Duration::days(1);
        }
        Utc.from_utc_datetime(&(open - Duration::seconds(self.offset.local_minus_utc().into())))
    }
}

impl Display for QuietHours {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} (UTC{})",
            self.start.format("%H:%M"),
            self.end.format("%H:%M"),
            self.offset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moscow_night() -> QuietHours {
        QuietHours::parse("22:00", "08:00", 180).unwrap()
    }

    fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn wraps_past_midnight() {
        let quiet = moscow_night();
        // 19:00 UTC is 22:00 in Moscow.
        assert!(!quiet.contains(utc(18, 59)));
        assert!(quiet.contains(utc(19, 0)));
        assert!(quiet.contains(utc(23, 30)));
        assert!(quiet.contains(utc(4, 59)));
        // 05:00 UTC is 08:00 in Moscow.
        assert!(!quiet.contains(utc(5, 0)));
        assert!(!quiet.contains(utc(12, 0)));
    }

    #[test]
    fn daytime_window_does_not_wrap() {
        let quiet = QuietHours::parse("13:00", "15:00", 0).unwrap();
        assert!(quiet.contains(utc(13, 0)));
        assert!(quiet.contains(utc(14, 59)));
        assert!(!quiet.contains(utc(15, 0)));
        assert!(!quiet.contains(utc(12, 59)));
    }

    #[test]
    fn equal_bounds_are_never_quiet() {
        let quiet = QuietHours::parse("08:00", "08:00", 0).unwrap();
        assert!(!quiet.contains(utc(8, 0)));
        assert!(!quiet.contains(utc(20, 0)));
    }

    #[test]
    fn next_open_before_midnight_is_next_morning() {
        let quiet = moscow_night();
        let opens = quiet.next_open(utc(20, 0));
        assert_eq!(opens, Utc.with_ymd_and_hms(2024, 3, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn next_open_after_midnight_is_same_morning() {
        let quiet = moscow_night();
        assert_eq!(quiet.next_open(utc(2, 15)), utc(5, 0));
    }

    #[test]
    fn next_open_outside_window_is_now() {
        let quiet = moscow_night();
        assert_eq!(quiet.next_open(utc(12, 0)), utc(12, 0));
    }

    #[test]
    fn rejects_malformed_bounds() {
        assert!(matches!(
            QuietHours::parse("25:00", "08:00", 0),
            Err(QuietHoursError::Time { value, .. }) if value == "25:00"
        ));
        assert!(matches!(
            QuietHours::parse("22:00", "8am", 0),
            Err(QuietHoursError::Time { value, .. }) if value == "8am"
        ));
        assert_eq!(
            QuietHours::parse("22:00", "08:00", 24 * 60),
            Err(QuietHoursError::Offset(24 * 60))
        );
    }
}
