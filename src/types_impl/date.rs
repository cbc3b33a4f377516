use crate::{CqlError, CqlResult};

// Day number of 1970-01-01 in the wire representation.
const DATE_EPOCH: u32 = 1_u32 << 31;

const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Implementation of the CQL `date` type.
///
/// The wire form is an unsigned 32-bit day number with the unix epoch at
/// 2^31, covering roughly the years −5,877,641 to +5,881,580. The type is
/// used internally to implement serialization to the wire; conversions use
/// proleptic-Gregorian day arithmetic because common calendar types do not
/// span this range. It is agnostic of timezones.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct CqlDate(u32);

impl CqlDate {
    /// The unix epoch, 1970-01-01.
    pub const EPOCH: Self = Self(DATE_EPOCH);

    /// Creates a date from the raw wire day number.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw wire day number.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Creates a date from a proleptic-Gregorian year, month (1..12) and
    /// day (1..31); year 0 exists and years may be negative.
    pub fn from_ymd(year: i64, month: u32, day: u32) -> CqlResult<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(CqlError::InvalidValue(format!(
                "no such calendar day: {year:04}-{month:02}-{day:02}"
            )));
        }
        let days = days_from_civil(year, month, day);
        let raw = days + i64::from(DATE_EPOCH);
        u32::try_from(raw)
            .map(Self)
            .map_err(|_| CqlError::InvalidValue(format!("date out of range: year {year}")))
    }

    /// Returns (year, month, day) in the proleptic Gregorian calendar.
    pub fn as_ymd(self) -> (i64, u32, u32) {
        civil_from_days(i64::from(self.0) - i64::from(DATE_EPOCH))
    }

    /// Converts into a `time::Date` where the year is in its supported range.
    pub fn to_date(self) -> CqlResult<time::Date> {
        let (year, month, day) = self.as_ymd();
        let year = i32::try_from(year)
            .map_err(|_| CqlError::Overflow(format!("year {year} exceeds time::Date")))?;
        #[allow(clippy::cast_possible_truncation)]
        let month = time::Month::try_from(month as u8)
            .map_err(|e| CqlError::InvalidValue(e.to_string()))?;
        #[allow(clippy::cast_possible_truncation)]
        time::Date::from_calendar_date(year, month, day as u8)
            .map_err(|_| CqlError::Overflow(format!("{self} exceeds time::Date")))
    }
}

impl From<time::Date> for CqlDate {
    fn from(date: time::Date) -> Self {
        let days = days_from_civil(
            i64::from(date.year()),
            u32::from(u8::from(date.month())),
            u32::from(date.day()),
        );
        #[allow(clippy::cast_possible_truncation)]
        #[allow(clippy::cast_sign_loss)]
        Self((days + i64::from(DATE_EPOCH)) as u32)
    }
}

impl std::fmt::Display for CqlDate {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (year, month, day) = self.as_ymd();
        write!(fmt, "{year:04}-{month:02}-{day:02}")
    }
}

// Day number of year/month/day relative to 1970-01-01, proleptic Gregorian.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let yoe = year - era * 400; // [0, 399]
    let mp = i64::from((month + 9) % 12); // [0, 11], March = 0
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146_097 + doe - 719_468
}

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365; // [0, 399]
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32; // [1, 31]
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32; // [1, 12]
    (if month <= 2 { year + 1 } else { year }, month, day)
}

/// Implementation of the CQL `time` type: nanoseconds since midnight,
/// 0 ..= 86,399,999,999,999.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct CqlTime(i64);

impl CqlTime {
    /// Creates a time from raw nanoseconds since midnight.
    pub fn new(nanos: i64) -> CqlResult<Self> {
        if (0..NANOS_PER_DAY).contains(&nanos) {
            Ok(Self(nanos))
        } else {
            Err(CqlError::InvalidValue(format!(
                "time value {nanos} out of range 0..{NANOS_PER_DAY}"
            )))
        }
    }

    /// Creates a time from hours, minutes, seconds and milliseconds.
    pub fn from_hms_milli(hour: u32, minute: u32, second: u32, milli: u32) -> CqlResult<Self> {
        if hour > 23 || minute > 59 || second > 59 || milli > 999 {
            return Err(CqlError::InvalidValue(format!(
                "no such time of day: {hour:02}:{minute:02}:{second:02}.{milli:03}"
            )));
        }
        Ok(Self(
            (i64::from(hour) * 3600 + i64::from(minute) * 60 + i64::from(second)) * 1_000_000_000
                + i64::from(milli) * 1_000_000,
        ))
    }

    /// Raw nanoseconds since midnight.
    pub fn nanos(self) -> i64 {
        self.0
    }

    /// Returns (hour, minute, second, nanosecond-of-second).
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn as_hms_nano(self) -> (u32, u32, u32, u32) {
        let secs = self.0 / 1_000_000_000;
        let nano = (self.0 % 1_000_000_000) as u32;
        (
            (secs / 3600) as u32,
            ((secs / 60) % 60) as u32,
            (secs % 60) as u32,
            nano,
        )
    }

    pub(crate) fn new_unchecked(nanos: i64) -> Self {
        Self(nanos)
    }
}

impl From<time::Time> for CqlTime {
    fn from(t: time::Time) -> Self {
        Self(
            i64::from(t.hour()) * 3_600_000_000_000
                + i64::from(t.minute()) * 60_000_000_000
                + i64::from(t.second()) * 1_000_000_000
                + i64::from(t.nanosecond()),
        )
    }
}

impl std::fmt::Display for CqlTime {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (hour, minute, second, nano) = self.as_hms_nano();
        write!(fmt, "{hour:02}:{minute:02}:{second:02}.{nano:09}")
    }
}

/// Implementation of the CQL `timestamp` type: signed milliseconds since the
/// unix epoch, agnostic of timezones.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct CqlTimestamp(i64);

impl CqlTimestamp {
    /// Creates a timestamp from raw milliseconds since the unix epoch.
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Raw milliseconds since the unix epoch.
    pub fn millis(self) -> i64 {
        self.0
    }

    /// Converts into a `time::OffsetDateTime` in UTC, where representable.
    pub fn to_offset_date_time(self) -> CqlResult<time::OffsetDateTime> {
        time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .map_err(|_| CqlError::Overflow(format!("timestamp {} exceeds OffsetDateTime", self.0)))
    }
}

impl From<time::OffsetDateTime> for CqlTimestamp {
    #[allow(clippy::cast_possible_truncation)]
    fn from(dt: time::OffsetDateTime) -> Self {
        Self((dt.unix_timestamp_nanos() / 1_000_000) as i64)
    }
}

impl std::fmt::Display for CqlTimestamp {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.to_offset_date_time() {
            Ok(dt) => write!(fmt, "{dt}"),
            Err(_) => write!(fmt, "timestamp({} ms)", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CqlDate, CqlTime, CqlTimestamp};

    #[test]
    fn epoch_is_centered() {
        assert_eq!(CqlDate::EPOCH.raw(), 1_u32 << 31);
        assert_eq!(CqlDate::from_ymd(1970, 1, 1).unwrap(), CqlDate::EPOCH);
        assert_eq!(CqlDate::EPOCH.as_ymd(), (1970, 1, 1));
    }

    #[test]
    fn extreme_years_round_trip() {
        for (y, m, d) in [
            (0, 3, 12),
            (-10, 2, 4),
            (5_881_580, 7, 11),
            (-5_877_641, 6, 23),
            (2016, 2, 29),
            (1582, 10, 4),
        ] {
            let date = CqlDate::from_ymd(y, m, d).unwrap();
            assert_eq!(date.as_ymd(), (y, m, d), "{y}-{m}-{d}");
            assert_eq!(CqlDate::new(date.raw()).as_ymd(), (y, m, d));
        }
    }

    #[test]
    fn beyond_the_representable_range() {
        assert!(CqlDate::from_ymd(5_881_581, 1, 1).is_err());
        assert!(CqlDate::from_ymd(-5_877_642, 1, 1).is_err());
        assert!(CqlDate::from_ymd(1970, 13, 1).is_err());
    }

    #[test]
    fn time_boundaries() {
        assert_eq!(CqlTime::from_hms_milli(0, 0, 0, 0).unwrap().nanos(), 0);
        let max = CqlTime::from_hms_milli(23, 59, 59, 999).unwrap();
        assert_eq!(max.as_hms_nano(), (23, 59, 59, 999_000_000));
        assert!(CqlTime::new(86_400_000_000_000).is_err());
        assert!(CqlTime::new(-1).is_err());
        assert!(CqlTime::new(86_399_999_999_999).is_ok());
    }

    #[test]
    fn timestamp_conversion() {
        let ts = CqlTimestamp::new(1_445_385_600_000);
        let dt = ts.to_offset_date_time().unwrap();
        assert_eq!(dt.year(), 2015);
        assert_eq!(u8::from(dt.month()), 10);
        assert_eq!(dt.day(), 21);
        assert_eq!(dt.time(), time::macros::time!(00:00:00));
        assert_eq!(CqlTimestamp::from(dt), ts);
    }
}
