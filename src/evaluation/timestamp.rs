//! Tolerant NewsREEL Timestamp Parsing
//!
//! The contest logs have used several date layouts over time:
//!
//! - `2013-10-20T00:00:00+0200`
//! - `2016-05-01 00:00:00,008`
//!
//! Date and time may be separated by any single character, and the time may be
//! followed by milliseconds and/or a zone. Only year, month, day, hour, minute
//! and second are considered; the fields are read as UTC.
//!
//! Plain integer fields are taken as epoch milliseconds unchanged.

use crate::evaluation::events::Millis;
use chrono::{NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::fmt;

lazy_static::lazy_static! {
    static ref NEWSREEL_DATE: Regex = Regex::new(
        r"([0-9]{4})-([0-9]{1,2})-([0-9]{1,2}).([0-9]{1,2}):([0-9]{1,2}):([0-9]{1,2})"
    )
    .expect("static date pattern is valid");
}

/// Error returned when a timestamp field cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The text does not contain a `Y-M-D?h:m:s` date.
    Unrecognized { input: String },
    /// The date matched the pattern but names an impossible calendar value.
    InvalidCalendar { input: String },
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecognized { input } => write!(f, "invalid dateString: {}", input),
            Self::InvalidCalendar { input } => {
                write!(f, "date out of calendar range: {}", input)
            }
        }
    }
}

impl std::error::Error for TimestampError {}

/// Parse a NewsREEL date string into epoch milliseconds (second precision, UTC).
pub fn parse_newsreel_timestamp(input: &str) -> Result<Millis, TimestampError> {
    let caps = NEWSREEL_DATE
        .captures(input)
        .ok_or_else(|| TimestampError::Unrecognized {
            input: input.to_string(),
        })?;

    // Every group is 1-4 ASCII digits, so these parses cannot overflow.
    let field = |i: usize| -> u32 { caps[i].parse().unwrap_or(0) };
    let year = field(1) as i32;

    let naive = NaiveDate::from_ymd_opt(year, field(2), field(3))
        .and_then(|d| d.and_hms_opt(field(4), field(5), field(6)))
        .ok_or_else(|| TimestampError::InvalidCalendar {
            input: input.to_string(),
        })?;

    Ok(Utc.from_utc_datetime(&naive).timestamp_millis())
}

/// Parse a log timestamp column: epoch millis if numeric, otherwise a date string.
pub fn parse_timestamp_field(input: &str) -> Result<Millis, TimestampError> {
    let trimmed = input.trim();
    if let Ok(millis) = trimmed.parse::<Millis>() {
        return Ok(millis);
    }
    parse_newsreel_timestamp(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2013-10-20T00:00:00Z
    const OCT_20_2013: Millis = 1_382_227_200_000;

    #[test]
    fn test_parses_iso_layout_with_zone() {
        assert_eq!(
            parse_newsreel_timestamp("2013-10-20T00:00:00+0200").unwrap(),
            OCT_20_2013
        );
    }

    #[test]
    fn test_parses_space_layout_with_millis() {
        // Milliseconds suffix is ignored.
        let t = parse_newsreel_timestamp("2016-05-01 00:00:00,008").unwrap();
        assert_eq!(t, 1_462_060_800_000);
    }

    #[test]
    fn test_single_digit_fields() {
        let a = parse_newsreel_timestamp("2013-10-20 1:2:3").unwrap();
        assert_eq!(a, OCT_20_2013 + 3_723_000);
    }

    #[test]
    fn test_invalid_month_rejected() {
        assert!(matches!(
            parse_newsreel_timestamp("2016-00-01 00:00:00,016"),
            Err(TimestampError::InvalidCalendar { .. })
        ));
        assert!(matches!(
            parse_newsreel_timestamp("2016-13-01 00:00:00,016"),
            Err(TimestampError::InvalidCalendar { .. })
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            parse_newsreel_timestamp("yesterday"),
            Err(TimestampError::Unrecognized { .. })
        ));
    }

    #[test]
    fn test_field_prefers_integer_millis() {
        assert_eq!(parse_timestamp_field("1500").unwrap(), 1500);
        assert_eq!(parse_timestamp_field(" 1382227200000 ").unwrap(), OCT_20_2013);
        assert_eq!(
            parse_timestamp_field("2013-10-20T00:00:00").unwrap(),
            OCT_20_2013
        );
    }
}
