use crate::protocol::util_sync;
use crate::{CqlError, CqlResult};

/// Implementation of the CQL `duration` type: months, days and nanoseconds,
/// each signed and carried independently on the wire (protocol ≥ 4).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct CqlDuration {
    /// Number of months.
    pub months: i32,
    /// Number of days.
    pub days: i32,
    /// Number of nanoseconds.
    pub nanoseconds: i64,
}

impl CqlDuration {
    /// Creates a duration; all three components must carry the same sign
    /// (or be zero), as the server enforces.
    pub fn new(months: i32, days: i32, nanoseconds: i64) -> CqlResult<Self> {
        let all_non_negative = months >= 0 && days >= 0 && nanoseconds >= 0;
        let all_non_positive = months <= 0 && days <= 0 && nanoseconds <= 0;
        if all_non_negative || all_non_positive {
            Ok(Self {
                months,
                days,
                nanoseconds,
            })
        } else {
            Err(CqlError::InvalidValue(format!(
                "duration components must agree in sign: \
                 months={months}, days={days}, nanoseconds={nanoseconds}"
            )))
        }
    }

    pub(crate) fn emit(&self, w: &mut dyn std::io::Write) -> CqlResult<()> {
        util_sync::write_vint(i64::from(self.months), w)?;
        util_sync::write_vint(i64::from(self.days), w)?;
        util_sync::write_vint(self.nanoseconds, w)?;
        Ok(())
    }

    pub(crate) fn parse(rdr: &mut dyn std::io::Read) -> CqlResult<Self> {
        let months = read_vint_i32(rdr)?;
        let days = read_vint_i32(rdr)?;
        let nanoseconds = util_sync::read_vint(rdr)?;
        Ok(Self {
            months,
            days,
            nanoseconds,
        })
    }
}

fn read_vint_i32(rdr: &mut dyn std::io::Read) -> CqlResult<i32> {
    let v = util_sync::read_vint(rdr)?;
    i32::try_from(v)
        .map_err(|_| CqlError::InvalidValue(format!("duration component {v} exceeds 32 bit")))
}

impl std::fmt::Display for CqlDuration {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "{}mo{}d{}ns",
            self.months, self.days, self.nanoseconds
        )
    }
}
