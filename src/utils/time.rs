use crate::err::ParseError;

use jiff::civil;
use jiff::tz::TimeZone;
use jiff::Timestamp;

/// Seconds between 1601-01-01 (the FILETIME epoch) and 1970-01-01.
const EPOCH_DELTA_SECONDS: i128 = 11_644_473_600;

/// Converts a FILETIME tick count (100ns units since 1601) to a UTC instant.
pub fn timestamp_from_filetime(ticks: u64, offset: u64) -> Result<Timestamp, ParseError> {
    let nanos = i128::from(ticks) * 100 - EPOCH_DELTA_SECONDS * 1_000_000_000;

    Timestamp::from_nanosecond(nanos).map_err(|_| ParseError::InvalidTimestamp { offset })
}

/// Converts the eight u16 fields of a SYSTEMTIME (year, month, day-of-week,
/// day, hour, minute, second, millisecond) to a UTC instant. The day-of-week
/// field is ignored.
pub fn timestamp_from_systemtime(fields: [u16; 8], offset: u64) -> Result<Timestamp, ParseError> {
    let [year, month, _day_of_week, day, hour, minute, second, millis] = fields;

    let invalid = ParseError::InvalidTimestamp { offset };

    let subsec_nanos =
        i32::try_from(u64::from(millis) * 1_000_000).map_err(|_| ParseError::InvalidTimestamp { offset })?;

    let datetime = civil::DateTime::new(
        i16::try_from(year).map_err(|_| ParseError::InvalidTimestamp { offset })?,
        i8::try_from(month).map_err(|_| ParseError::InvalidTimestamp { offset })?,
        i8::try_from(day).map_err(|_| ParseError::InvalidTimestamp { offset })?,
        i8::try_from(hour).map_err(|_| ParseError::InvalidTimestamp { offset })?,
        i8::try_from(minute).map_err(|_| ParseError::InvalidTimestamp { offset })?,
        i8::try_from(second).map_err(|_| ParseError::InvalidTimestamp { offset })?,
        subsec_nanos,
    )
    .map_err(|_| invalid)?;

    Ok(datetime
        .to_zoned(TimeZone::UTC)
        .map_err(|_| ParseError::InvalidTimestamp { offset })?
        .timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filetime_unix_epoch() {
        let ts = timestamp_from_filetime(116_444_736_000_000_000, 0).unwrap();
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_filetime_with_fraction() {
        let ts = timestamp_from_filetime(131_124_751_715_000_000, 0).unwrap();
        assert_eq!(ts.to_string(), "2016-07-08T18:12:51.5Z");
    }

    #[test]
    fn test_filetime_out_of_range_is_invalid() {
        assert!(matches!(
            timestamp_from_filetime(u64::MAX, 42),
            Err(ParseError::InvalidTimestamp { offset: 42 })
        ));
    }

    #[test]
    fn test_systemtime_skips_day_of_week() {
        let ts = timestamp_from_systemtime([2019, 3, 6, 30, 12, 0, 0, 500], 0).unwrap();
        assert_eq!(ts.to_string(), "2019-03-30T12:00:00.5Z");
    }

    #[test]
    fn test_systemtime_rejects_bad_month() {
        assert!(timestamp_from_systemtime([2019, 13, 0, 1, 0, 0, 0, 0], 0).is_err());
    }
}
